use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Historical figure metadata passed along with generation requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FigureRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figure_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figure_name: Option<String>,
}

impl FigureRef {
    pub fn new(figure_id: impl Into<String>, figure_name: impl Into<String>) -> Self {
        Self {
            figure_id: Some(figure_id.into()),
            figure_name: Some(figure_name.into()),
        }
    }

    /// Label used in logs.
    pub fn label(&self) -> &str {
        self.figure_name
            .as_deref()
            .or(self.figure_id.as_deref())
            .unwrap_or("unknown")
    }
}
