use std::collections::HashMap;
use std::sync::Arc;

use config::shared::RetryConfig;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::Cache;
use crate::error::OptimizerResult;
use crate::retry::{TRANSIENT_ERROR_KINDS, retry_with_backoff};
use crate::store::base::OptimizerStore;
use crate::types::{Database, KeyRow, TargetTable};

/// Natural key to surrogate id of every row of a table.
pub type IdMap = HashMap<String, i64>;

#[derive(Debug, Default)]
struct Inner {
    initialized: bool,
    ids: Arc<IdMap>,
    max_id: Option<i64>,
}

impl Inner {
    fn replace(&mut self, keys: Vec<KeyRow>) {
        self.max_id = keys.iter().map(|key| key.id).max();
        self.ids = Arc::new(keys.into_iter().map(|key| (key.geotab_id, key.id)).collect());
        self.initialized = true;
    }

    fn extend(&mut self, keys: Vec<KeyRow>) {
        if keys.is_empty() {
            return;
        }

        self.max_id = self.max_id.max(keys.iter().map(|key| key.id).max());
        Arc::make_mut(&mut self.ids).extend(keys.into_iter().map(|key| (key.geotab_id, key.id)));
    }
}

/// Maps natural keys of an Optimizer table to surrogate ids.
///
/// Rows of the Optimizer tables only ever gain ids, so an incremental update loads the rows
/// with an id above the largest one seen.
#[derive(Debug, Clone)]
pub struct IdCache<O> {
    table: TargetTable,
    store: O,
    retry: RetryConfig,
    inner: Arc<Mutex<Inner>>,
}

impl<O> IdCache<O>
where
    O: OptimizerStore,
{
    pub fn new(table: TargetTable, store: O, retry: RetryConfig) -> Self {
        Self {
            table,
            store,
            retry,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn table(&self) -> TargetTable {
        self.table
    }

    pub async fn get_object_id(&self, geotab_id: &str) -> Option<i64> {
        self.inner.lock().await.ids.get(geotab_id).copied()
    }

    /// Current content of the cache. Later updates do not change the returned map.
    pub async fn snapshot(&self) -> Arc<IdMap> {
        self.inner.lock().await.ids.clone()
    }

    async fn load(&self, after_id: Option<i64>) -> OptimizerResult<Vec<KeyRow>> {
        retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Optimizer, || {
            self.store.load_keys(self.table, after_id)
        })
        .await
    }
}

impl<O> Cache for IdCache<O>
where
    O: OptimizerStore,
{
    async fn is_initialized(&self) -> bool {
        self.inner.lock().await.initialized
    }

    async fn initialize(&self) -> OptimizerResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.initialized {
            return Ok(());
        }

        let keys = self.load(None).await?;
        debug!(table = %self.table, rows = keys.len(), "id cache initialized");
        inner.replace(keys);

        Ok(())
    }

    async fn update(&self, force_full_refresh: bool) -> OptimizerResult<()> {
        let mut inner = self.inner.lock().await;

        if force_full_refresh || !inner.initialized {
            let keys = self.load(None).await?;
            inner.replace(keys);
        } else {
            let keys = self.load(inner.max_id).await?;
            inner.extend(keys);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryOptimizerStore;

    fn retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 1,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_factor: 1.0,
        }
    }

    #[tokio::test]
    async fn incremental_updates_pick_up_new_rows_without_changing_snapshots() {
        let store = MemoryOptimizerStore::new();
        store
            .insert_missing_keys(TargetTable::Controllers, &["c1".to_owned()])
            .await
            .unwrap();

        let cache = IdCache::new(TargetTable::Controllers, store.clone(), retry());
        cache.initialize().await.unwrap();
        let before = cache.snapshot().await;

        store
            .insert_missing_keys(TargetTable::Controllers, &["c2".to_owned()])
            .await
            .unwrap();
        assert_eq!(cache.get_object_id("c2").await, None);

        cache.update(false).await.unwrap();

        assert!(cache.get_object_id("c2").await.is_some());
        assert_eq!(before.len(), 1);
        assert_eq!(cache.snapshot().await.len(), 2);
    }
}
