//! In-memory caches used to resolve natural keys during mapping.
//!
//! All caches are cheap to clone and share their content, so one instance per table serves every
//! worker of the process. They are only eventually consistent with their table: a worker that
//! depends on rows written in the same iteration must force a refresh first.

pub mod id;
pub mod lookup;
pub mod object;

use std::future::Future;

use config::shared::RetryConfig;

use crate::cache::id::IdCache;
use crate::cache::lookup::LookupCache;
use crate::error::OptimizerResult;
use crate::mapping::{DimensionKind, EntityKind};
use crate::store::base::OptimizerStore;
use crate::types::TargetTable;

/// Lifecycle shared by every cache.
pub trait Cache: Send + Sync {
    fn is_initialized(&self) -> impl Future<Output = bool> + Send;

    /// Loads the whole table. Does nothing when already initialized.
    fn initialize(&self) -> impl Future<Output = OptimizerResult<()>> + Send;

    /// Loads what changed since the last load, or the whole table when `force_full_refresh` is
    /// set. Initializes the cache if needed.
    fn update(&self, force_full_refresh: bool) -> impl Future<Output = OptimizerResult<()>> + Send;
}

/// Optimizer-side caches shared by every processor of the process.
#[derive(Debug, Clone)]
pub struct ReferenceCaches<O> {
    devices: IdCache<O>,
    diagnostics: IdCache<O>,
    users: IdCache<O>,
    binary_types: LookupCache<O>,
    controllers: LookupCache<O>,
    driver_change_types: LookupCache<O>,
}

impl<O> ReferenceCaches<O>
where
    O: OptimizerStore,
{
    pub fn new(store: O, retry: RetryConfig) -> Self {
        let id_cache = |table| IdCache::new(table, store.clone(), retry.clone());
        let lookup_cache = |table| LookupCache::new(table, store.clone(), retry.clone());

        Self {
            devices: id_cache(TargetTable::Devices),
            diagnostics: id_cache(TargetTable::Diagnostics),
            users: id_cache(TargetTable::Users),
            binary_types: lookup_cache(TargetTable::BinaryTypes),
            controllers: lookup_cache(TargetTable::Controllers),
            driver_change_types: lookup_cache(TargetTable::DriverChangeTypes),
        }
    }

    pub fn entity(&self, kind: EntityKind) -> &IdCache<O> {
        match kind {
            EntityKind::Device => &self.devices,
            EntityKind::Diagnostic => &self.diagnostics,
            EntityKind::User => &self.users,
        }
    }

    pub fn dimension(&self, kind: DimensionKind) -> &LookupCache<O> {
        match kind {
            DimensionKind::BinaryType => &self.binary_types,
            DimensionKind::Controller => &self.controllers,
            DimensionKind::DriverChangeType => &self.driver_change_types,
        }
    }

    /// The entity cache mirroring `table`, if any.
    pub fn populated_by(&self, table: TargetTable) -> Option<&IdCache<O>> {
        match table {
            TargetTable::Devices => Some(&self.devices),
            TargetTable::Diagnostics => Some(&self.diagnostics),
            TargetTable::Users => Some(&self.users),
            _ => None,
        }
    }
}
