use std::collections::{BTreeSet, HashMap};

use config::shared::RetryConfig;
use tracing::info;

use crate::bail;
use crate::cache::Cache;
use crate::cache::id::{IdCache, IdMap};
use crate::error::{ErrorKind, OptimizerResult};
use crate::retry::{TRANSIENT_ERROR_KINDS, retry_with_backoff};
use crate::store::base::OptimizerStore;
use crate::types::{Database, TargetTable};

/// Id cache of a dimension table whose rows are created on first reference.
#[derive(Debug, Clone)]
pub struct LookupCache<O> {
    ids: IdCache<O>,
    store: O,
    retry: RetryConfig,
}

impl<O> LookupCache<O>
where
    O: OptimizerStore,
{
    pub fn new(table: TargetTable, store: O, retry: RetryConfig) -> Self {
        Self {
            ids: IdCache::new(table, store.clone(), retry.clone()),
            store,
            retry,
        }
    }

    pub fn table(&self) -> TargetTable {
        self.ids.table()
    }

    pub async fn get_object_id(&self, geotab_id: &str) -> Option<i64> {
        self.ids.get_object_id(geotab_id).await
    }

    /// Resolves every key in `keys`, inserting the dimension rows that do not exist yet.
    ///
    /// Fails with [`ErrorKind::InvalidState`] when a key is still unknown after its row was
    /// inserted and the cache refreshed.
    pub async fn get_or_create(&self, keys: &BTreeSet<String>) -> OptimizerResult<IdMap> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        self.ids.initialize().await?;
        let known = self.ids.snapshot().await;
        let missing: Vec<String> = keys
            .iter()
            .filter(|key| !known.contains_key(*key))
            .cloned()
            .collect();

        let known = if missing.is_empty() {
            known
        } else {
            let inserted =
                retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Optimizer, || {
                    self.store.insert_missing_keys(self.table(), &missing)
                })
                .await?;
            info!(table = %self.table(), inserted, "created missing dimension rows");

            self.ids.update(true).await?;
            self.ids.snapshot().await
        };

        let mut resolved = HashMap::with_capacity(keys.len());
        for key in keys {
            let Some(id) = known.get(key) else {
                bail!(
                    ErrorKind::InvalidState,
                    "Dimension row is missing right after it was created",
                    format!("{} has no row for '{}'", self.table(), key)
                );
            };
            resolved.insert(key.clone(), *id);
        }

        Ok(resolved)
    }
}

impl<O> Cache for LookupCache<O>
where
    O: OptimizerStore,
{
    async fn is_initialized(&self) -> bool {
        self.ids.is_initialized().await
    }

    async fn initialize(&self) -> OptimizerResult<()> {
        self.ids.initialize().await
    }

    async fn update(&self, force_full_refresh: bool) -> OptimizerResult<()> {
        self.ids.update(force_full_refresh).await
    }
}
