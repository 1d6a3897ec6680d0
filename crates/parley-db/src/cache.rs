//! Repository for media cache tables.

use std::marker::PhantomData;

use chrono::Utc;
use tracing::debug;

use parley_models::CacheRow;

use crate::client::DbClient;
use crate::error::DbResult;

/// Typed access to one cache table.
pub struct CacheRepository<T: CacheRow> {
    client: DbClient,
    _row: PhantomData<T>,
}

impl<T: CacheRow> Clone for CacheRepository<T> {
    fn clone(&self) -> Self {
        Self::new(self.client.clone())
    }
}

impl<T: CacheRow> CacheRepository<T> {
    pub fn new(client: DbClient) -> Self {
        Self {
            client,
            _row: PhantomData,
        }
    }

    /// Row for `key`, or `None` when missing or expired.
    pub async fn get_fresh(&self, key: &str) -> DbResult<Option<T>> {
        let row: Option<T> = self.client.select_one(T::TABLE, T::KEY_COLUMN, key).await?;
        Ok(row.filter(|r| {
            let fresh = r.is_fresh(Utc::now());
            if !fresh {
                debug!(table = T::TABLE, key, "Cache row expired");
            }
            fresh
        }))
    }

    /// Insert or replace the row for its key.
    pub async fn upsert(&self, row: &T) -> DbResult<T> {
        self.client.upsert(T::TABLE, T::KEY_COLUMN, row).await
    }
}
