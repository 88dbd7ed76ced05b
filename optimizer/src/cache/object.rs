use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use config::shared::RetryConfig;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::Cache;
use crate::error::OptimizerResult;
use crate::retry::{TRANSIENT_ERROR_KINDS, retry_with_backoff};
use crate::store::base::AdapterStore;
use crate::types::{ChangeTrackedRecord, Database};

#[derive(Debug)]
struct Inner<R> {
    initialized: bool,
    by_id: HashMap<i64, R>,
    ids_by_key: HashMap<String, i64>,
    last_changed_utc: Option<DateTime<Utc>>,
}

impl<R> Inner<R>
where
    R: ChangeTrackedRecord,
{
    fn new() -> Self {
        Self {
            initialized: false,
            by_id: HashMap::new(),
            ids_by_key: HashMap::new(),
            last_changed_utc: None,
        }
    }

    fn upsert(&mut self, row: R) {
        self.last_changed_utc = self.last_changed_utc.max(Some(row.record_last_changed_utc()));

        if let Some(previous) = self.by_id.get(&row.id()) {
            if previous.geotab_id() != row.geotab_id() {
                self.ids_by_key.remove(previous.geotab_id());
            }
        }

        self.ids_by_key.insert(row.geotab_id().to_owned(), row.id());
        self.by_id.insert(row.id(), row);
    }
}

/// Full mirror of a change-tracked Adapter table.
///
/// Incremental updates reload the rows changed at or after the newest change seen so far, so a
/// row changed within the same instant as the previous update is not missed. Rows deleted from
/// the table only disappear on a full refresh.
#[derive(Debug)]
pub struct ObjectCache<R, A> {
    adapter: A,
    retry: RetryConfig,
    inner: Arc<Mutex<Inner<R>>>,
}

impl<R, A: Clone> Clone for ObjectCache<R, A> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            retry: self.retry.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<R, A> ObjectCache<R, A>
where
    R: ChangeTrackedRecord,
    A: AdapterStore,
{
    pub fn new(adapter: A, retry: RetryConfig) -> Self {
        Self {
            adapter,
            retry,
            inner: Arc::new(Mutex::new(Inner::new())),
        }
    }

    /// Returns the row with natural key `geotab_id`.
    pub async fn get_object(&self, geotab_id: &str) -> Option<R> {
        let inner = self.inner.lock().await;
        let id = inner.ids_by_key.get(geotab_id)?;

        inner.by_id.get(id).cloned()
    }

    /// Returns the rows changed strictly after `changed_since`, or every row when it is `None`,
    /// ordered by `(record_last_changed_utc, id)`.
    pub async fn get_objects(&self, changed_since: Option<DateTime<Utc>>) -> Vec<R> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<R> = inner
            .by_id
            .values()
            .filter(|row| changed_since.is_none_or(|since| row.record_last_changed_utc() > since))
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.record_last_changed_utc(), row.id()));

        rows
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_id.len()
    }

    async fn load(&self, since: Option<DateTime<Utc>>) -> OptimizerResult<Vec<R>> {
        retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Adapter, || {
            self.adapter.fetch_changed_since::<R>(since)
        })
        .await
    }

    async fn reload(&self, inner: &mut Inner<R>) -> OptimizerResult<()> {
        let rows = self.load(None).await?;

        let mut fresh = Inner::new();
        for row in rows {
            fresh.upsert(row);
        }
        fresh.initialized = true;
        *inner = fresh;

        debug!(
            table = R::TABLE.as_str(),
            rows = inner.by_id.len(),
            "object cache loaded"
        );

        Ok(())
    }
}

impl<R, A> Cache for ObjectCache<R, A>
where
    R: ChangeTrackedRecord,
    A: AdapterStore,
{
    async fn is_initialized(&self) -> bool {
        self.inner.lock().await.initialized
    }

    async fn initialize(&self) -> OptimizerResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.initialized {
            return Ok(());
        }

        self.reload(&mut inner).await
    }

    async fn update(&self, force_full_refresh: bool) -> OptimizerResult<()> {
        let mut inner = self.inner.lock().await;

        if force_full_refresh || !inner.initialized {
            return self.reload(&mut inner).await;
        }

        let rows = self.load(inner.last_changed_utc).await?;
        for row in rows {
            inner.upsert(row);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::store::memory::MemoryAdapterStore;
    use crate::types::AdapterUser;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 8, minute, 0).unwrap()
    }

    fn user(id: i64, name: &str, minute: u32) -> AdapterUser {
        AdapterUser {
            id,
            geotab_id: format!("u{id}"),
            name: name.to_owned(),
            first_name: None,
            last_name: None,
            employee_no: None,
            is_driver: true,
            active_from: None,
            active_to: None,
            record_last_changed_utc: at(minute),
        }
    }

    fn retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 1,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_factor: 1.0,
        }
    }

    #[tokio::test]
    async fn changed_rows_are_returned_in_change_order() {
        let adapter = MemoryAdapterStore::new();
        adapter
            .insert_rows(&[user(1, "a", 5), user(2, "b", 1), user(3, "c", 5)])
            .await
            .unwrap();
        let cache = ObjectCache::<AdapterUser, _>::new(adapter.clone(), retry());
        cache.initialize().await.unwrap();

        let all = cache.get_objects(None).await;
        assert_eq!(all.iter().map(|row| row.id).collect::<Vec<_>>(), vec![2, 1, 3]);

        let changed = cache.get_objects(Some(at(1))).await;
        assert_eq!(changed.iter().map(|row| row.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[tokio::test]
    async fn incremental_update_replaces_changed_rows() {
        let adapter = MemoryAdapterStore::new();
        adapter.insert_rows(&[user(1, "before", 1)]).await.unwrap();
        let cache = ObjectCache::<AdapterUser, _>::new(adapter.clone(), retry());
        cache.initialize().await.unwrap();

        adapter.insert_rows(&[user(1, "after", 2), user(2, "new", 2)]).await.unwrap();
        cache.update(false).await.unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get_object("u1").await.unwrap().name, "after");
    }
}
