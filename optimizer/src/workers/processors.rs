//! The eight ETL processors: one mapper per Adapter table plus the way each one is wired.

use config::shared::{ProcessorConfig, RetryConfig};

use crate::cache::ReferenceCaches;
use crate::cache::object::ObjectCache;
use crate::mapping::{DimensionKeys, DimensionKind, EntityKind, EntityMapper, Resolver};
use crate::persister::EntityPersister;
use crate::store::base::{AdapterStore, OptimizerStore};
use crate::tracker::ProcessorTracker;
use crate::types::{
    AdapterBinaryData, AdapterDevice, AdapterDiagnostic, AdapterDriverChange, AdapterFaultData,
    AdapterLogRecord, AdapterStatusData, AdapterUser, ChangeTrackedRecord, OptimizerBinaryData,
    OptimizerDevice, OptimizerDiagnostic, OptimizerDriverChange, OptimizerFaultData,
    OptimizerLogRecord, OptimizerStatusData, OptimizerUser, PagedSourceRecord, ProcessorId,
};
use crate::workers::etl::EtlProcessor;
use crate::workers::strategy::{DiffSource, PageSource};

/// Workers that must be running and have processed entities before `processor` iterates.
///
/// Processors depend on the processors of the entities they reference. Enrichment optimizers
/// declare their prerequisites themselves since they depend on their configuration.
pub fn processor_prerequisites(processor: ProcessorId) -> Vec<ProcessorId> {
    use ProcessorId::*;

    match processor {
        LogRecordProcessor | BinaryDataProcessor => vec![DeviceProcessor],
        StatusDataProcessor => vec![DeviceProcessor, DiagnosticProcessor],
        FaultDataProcessor => vec![DeviceProcessor, DiagnosticProcessor, UserProcessor],
        DriverChangeProcessor => vec![DeviceProcessor, UserProcessor],
        DeviceProcessor | DiagnosticProcessor | UserProcessor => Vec::new(),
        FaultDataOptimizer | StatusDataOptimizer | Orchestrator => Vec::new(),
    }
}

pub struct DeviceMapper;

impl EntityMapper for DeviceMapper {
    type Source = AdapterDevice;
    type Target = OptimizerDevice;

    const ENTITIES: &'static [EntityKind] = &[];

    fn map(source: &AdapterDevice, _resolver: &mut Resolver<'_>) -> Option<OptimizerDevice> {
        Some(OptimizerDevice {
            geotab_id: source.geotab_id.clone(),
            name: source.name.clone(),
            serial_number: source.serial_number.clone(),
            device_type: source.device_type.clone(),
            license_plate: source.license_plate.clone(),
            vin: source.vin.clone(),
            active_from: source.active_from,
            active_to: source.active_to,
            record_last_changed_utc: source.record_last_changed_utc,
        })
    }
}

pub struct UserMapper;

impl EntityMapper for UserMapper {
    type Source = AdapterUser;
    type Target = OptimizerUser;

    const ENTITIES: &'static [EntityKind] = &[];

    fn map(source: &AdapterUser, _resolver: &mut Resolver<'_>) -> Option<OptimizerUser> {
        Some(OptimizerUser {
            geotab_id: source.geotab_id.clone(),
            name: source.name.clone(),
            first_name: source.first_name.clone(),
            last_name: source.last_name.clone(),
            employee_no: source.employee_no.clone(),
            is_driver: source.is_driver,
            active_from: source.active_from,
            active_to: source.active_to,
            record_last_changed_utc: source.record_last_changed_utc,
        })
    }
}

pub struct DiagnosticMapper;

impl EntityMapper for DiagnosticMapper {
    type Source = AdapterDiagnostic;
    type Target = OptimizerDiagnostic;

    const ENTITIES: &'static [EntityKind] = &[];
    const DIMENSIONS: &'static [DimensionKind] = &[DimensionKind::Controller];

    fn dimension_keys(source: &AdapterDiagnostic, keys: &mut DimensionKeys) {
        keys.add_optional(DimensionKind::Controller, source.controller_id.as_deref());
    }

    fn map(source: &AdapterDiagnostic, resolver: &mut Resolver<'_>) -> Option<OptimizerDiagnostic> {
        let controller_id =
            resolver.optional_dimension(DimensionKind::Controller, source.controller_id.as_deref())?;

        Some(OptimizerDiagnostic {
            geotab_id: source.geotab_id.clone(),
            name: source.diagnostic_name.clone(),
            code: source.diagnostic_code,
            source_name: source.diagnostic_source_name.clone(),
            unit_of_measure: source.diagnostic_unit_of_measure_name.clone(),
            controller_id,
            record_last_changed_utc: source.record_last_changed_utc,
        })
    }
}

pub struct LogRecordMapper;

impl EntityMapper for LogRecordMapper {
    type Source = AdapterLogRecord;
    type Target = OptimizerLogRecord;

    const ENTITIES: &'static [EntityKind] = &[EntityKind::Device];

    fn map(source: &AdapterLogRecord, resolver: &mut Resolver<'_>) -> Option<OptimizerLogRecord> {
        let device_id = resolver.entity(EntityKind::Device, &source.device_id)?;

        Some(OptimizerLogRecord {
            geotab_id: source.geotab_id.clone(),
            date_time: source.date_time,
            device_id,
            latitude: source.latitude,
            longitude: source.longitude,
            speed: source.speed,
            record_creation_time_utc: source.record_creation_time_utc,
        })
    }
}

pub struct StatusDataMapper;

impl EntityMapper for StatusDataMapper {
    type Source = AdapterStatusData;
    type Target = OptimizerStatusData;

    const ENTITIES: &'static [EntityKind] = &[EntityKind::Device, EntityKind::Diagnostic];

    fn map(source: &AdapterStatusData, resolver: &mut Resolver<'_>) -> Option<OptimizerStatusData> {
        let device_id = resolver.entity(EntityKind::Device, &source.device_id);
        let diagnostic_id = resolver.entity(EntityKind::Diagnostic, &source.diagnostic_id);

        Some(OptimizerStatusData {
            geotab_id: source.geotab_id.clone(),
            date_time: source.date_time,
            device_id: device_id?,
            diagnostic_id: diagnostic_id?,
            data: source.data,
            record_creation_time_utc: source.record_creation_time_utc,
        })
    }
}

pub struct FaultDataMapper;

impl EntityMapper for FaultDataMapper {
    type Source = AdapterFaultData;
    type Target = OptimizerFaultData;

    const ENTITIES: &'static [EntityKind] = &[
        EntityKind::Device,
        EntityKind::Diagnostic,
        EntityKind::User,
    ];
    const DIMENSIONS: &'static [DimensionKind] = &[DimensionKind::Controller];

    fn dimension_keys(source: &AdapterFaultData, keys: &mut DimensionKeys) {
        keys.add(DimensionKind::Controller, &source.controller_id);
    }

    fn map(source: &AdapterFaultData, resolver: &mut Resolver<'_>) -> Option<OptimizerFaultData> {
        let device_id = resolver.entity(EntityKind::Device, &source.device_id);
        let diagnostic_id = resolver.entity(EntityKind::Diagnostic, &source.diagnostic_id);
        let dismiss_user_id =
            resolver.optional_entity(EntityKind::User, source.dismiss_user_id.as_deref());
        let controller_id = resolver.dimension(DimensionKind::Controller, &source.controller_id);

        Some(OptimizerFaultData {
            geotab_id: source.geotab_id.clone(),
            date_time: source.date_time,
            device_id: device_id?,
            diagnostic_id: diagnostic_id?,
            controller_id: controller_id?,
            failure_mode_code: source.failure_mode_code,
            fault_state: source.fault_state.clone(),
            dismiss_user_id: dismiss_user_id?,
            dismiss_date_time: source.dismiss_date_time,
            count: source.count,
            record_creation_time_utc: source.record_creation_time_utc,
        })
    }
}

pub struct BinaryDataMapper;

impl EntityMapper for BinaryDataMapper {
    type Source = AdapterBinaryData;
    type Target = OptimizerBinaryData;

    const ENTITIES: &'static [EntityKind] = &[EntityKind::Device];
    const DIMENSIONS: &'static [DimensionKind] =
        &[DimensionKind::BinaryType, DimensionKind::Controller];

    fn dimension_keys(source: &AdapterBinaryData, keys: &mut DimensionKeys) {
        keys.add_optional(DimensionKind::BinaryType, source.binary_type.as_deref());
        keys.add(DimensionKind::Controller, &source.controller_id);
    }

    fn map(source: &AdapterBinaryData, resolver: &mut Resolver<'_>) -> Option<OptimizerBinaryData> {
        let device_id = resolver.entity(EntityKind::Device, &source.device_id);
        let binary_type_id =
            resolver.optional_dimension(DimensionKind::BinaryType, source.binary_type.as_deref());
        let controller_id = resolver.dimension(DimensionKind::Controller, &source.controller_id);

        Some(OptimizerBinaryData {
            geotab_id: source.geotab_id.clone(),
            date_time: source.date_time,
            device_id: device_id?,
            binary_type_id: binary_type_id?,
            controller_id: controller_id?,
            data: source.data.clone(),
            record_creation_time_utc: source.record_creation_time_utc,
        })
    }
}

pub struct DriverChangeMapper;

impl EntityMapper for DriverChangeMapper {
    type Source = AdapterDriverChange;
    type Target = OptimizerDriverChange;

    const ENTITIES: &'static [EntityKind] = &[EntityKind::Device, EntityKind::User];
    const DIMENSIONS: &'static [DimensionKind] = &[DimensionKind::DriverChangeType];

    fn dimension_keys(source: &AdapterDriverChange, keys: &mut DimensionKeys) {
        keys.add(DimensionKind::DriverChangeType, &source.driver_change_type);
    }

    fn map(
        source: &AdapterDriverChange,
        resolver: &mut Resolver<'_>,
    ) -> Option<OptimizerDriverChange> {
        let device_id = resolver.entity(EntityKind::Device, &source.device_id);
        let driver_id = resolver.entity(EntityKind::User, &source.driver_id);
        let driver_change_type_id =
            resolver.dimension(DimensionKind::DriverChangeType, &source.driver_change_type);

        Some(OptimizerDriverChange {
            geotab_id: source.geotab_id.clone(),
            date_time: source.date_time,
            device_id: device_id?,
            driver_id: driver_id?,
            driver_change_type_id: driver_change_type_id?,
            version: source.version,
            record_creation_time_utc: source.record_creation_time_utc,
        })
    }
}

pub type PagedProcessor<M, A, O> =
    EtlProcessor<M, PageSource<<M as EntityMapper>::Source, A>, A, O>;

pub type DiffProcessor<M, A, O> =
    EtlProcessor<M, DiffSource<<M as EntityMapper>::Source, A>, A, O>;

/// Builds processors sharing one set of caches and one persister.
#[derive(Debug, Clone)]
pub struct ProcessorFactory<A, O> {
    adapter: A,
    caches: ReferenceCaches<O>,
    persister: EntityPersister<A, O>,
    tracker: ProcessorTracker<O>,
    retry: RetryConfig,
}

impl<A, O> ProcessorFactory<A, O>
where
    A: AdapterStore,
    O: OptimizerStore,
{
    pub fn new(adapter: A, optimizer: O, retry: RetryConfig) -> Self {
        Self {
            caches: ReferenceCaches::new(optimizer.clone(), retry.clone()),
            persister: EntityPersister::new(adapter.clone(), optimizer.clone(), retry.clone()),
            tracker: ProcessorTracker::new(optimizer, retry.clone()),
            adapter,
            retry,
        }
    }

    pub fn caches(&self) -> &ReferenceCaches<O> {
        &self.caches
    }

    fn paged<M>(&self, id: ProcessorId, config: &ProcessorConfig) -> PagedProcessor<M, A, O>
    where
        M: EntityMapper,
        M::Source: PagedSourceRecord,
    {
        EtlProcessor::new(
            id,
            config.clone(),
            processor_prerequisites(id),
            PageSource::new(self.adapter.clone(), self.retry.clone()),
            self.caches.clone(),
            self.persister.clone(),
            self.tracker.clone(),
        )
    }

    fn diffed<M>(&self, id: ProcessorId, config: &ProcessorConfig) -> DiffProcessor<M, A, O>
    where
        M: EntityMapper,
        M::Source: ChangeTrackedRecord,
    {
        let cache = ObjectCache::new(self.adapter.clone(), self.retry.clone());

        EtlProcessor::new(
            id,
            config.clone(),
            processor_prerequisites(id),
            DiffSource::new(cache),
            self.caches.clone(),
            self.persister.clone(),
            self.tracker.clone(),
        )
    }

    pub fn device(&self, config: &ProcessorConfig) -> DiffProcessor<DeviceMapper, A, O> {
        self.diffed(ProcessorId::DeviceProcessor, config)
    }

    pub fn user(&self, config: &ProcessorConfig) -> DiffProcessor<UserMapper, A, O> {
        self.diffed(ProcessorId::UserProcessor, config)
    }

    pub fn diagnostic(&self, config: &ProcessorConfig) -> DiffProcessor<DiagnosticMapper, A, O> {
        self.diffed(ProcessorId::DiagnosticProcessor, config)
    }

    pub fn log_record(&self, config: &ProcessorConfig) -> PagedProcessor<LogRecordMapper, A, O> {
        self.paged(ProcessorId::LogRecordProcessor, config)
    }

    pub fn status_data(
        &self,
        config: &ProcessorConfig,
    ) -> PagedProcessor<StatusDataMapper, A, O> {
        self.paged(ProcessorId::StatusDataProcessor, config)
    }

    pub fn fault_data(&self, config: &ProcessorConfig) -> PagedProcessor<FaultDataMapper, A, O> {
        self.paged(ProcessorId::FaultDataProcessor, config)
    }

    pub fn binary_data(
        &self,
        config: &ProcessorConfig,
    ) -> PagedProcessor<BinaryDataMapper, A, O> {
        self.paged(ProcessorId::BinaryDataProcessor, config)
    }

    pub fn driver_change(
        &self,
        config: &ProcessorConfig,
    ) -> PagedProcessor<DriverChangeMapper, A, O> {
        self.paged(ProcessorId::DriverChangeProcessor, config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::mapping::{References, map_row};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 9, minute, 0).unwrap()
    }

    fn fault(dismiss_user_id: Option<&str>) -> AdapterFaultData {
        AdapterFaultData {
            id: 1,
            geotab_id: "f1".to_owned(),
            date_time: at(5),
            device_id: "b1".to_owned(),
            diagnostic_id: "d1".to_owned(),
            controller_id: "c1".to_owned(),
            failure_mode_code: Some(3),
            fault_state: Some("Active".to_owned()),
            dismiss_user_id: dismiss_user_id.map(str::to_owned),
            dismiss_date_time: None,
            count: Some(1),
            record_creation_time_utc: at(6),
        }
    }

    fn references() -> References {
        let mut references = References::default();
        references
            .with_entities(
                EntityKind::Device,
                Arc::new(HashMap::from([("b1".to_owned(), 11)])),
            )
            .with_entities(
                EntityKind::Diagnostic,
                Arc::new(HashMap::from([("d1".to_owned(), 21)])),
            )
            .with_entities(EntityKind::User, Arc::new(HashMap::new()))
            .with_dimensions(
                DimensionKind::Controller,
                HashMap::from([("c1".to_owned(), 31)]),
            );
        references
    }

    #[test]
    fn fault_data_references_are_resolved_to_surrogate_ids() {
        let mapped = map_row::<FaultDataMapper>(&fault(None), &references()).unwrap();

        assert_eq!(mapped.device_id, 11);
        assert_eq!(mapped.diagnostic_id, 21);
        assert_eq!(mapped.controller_id, 31);
        assert_eq!(mapped.dismiss_user_id, None);
        assert_eq!(mapped.record_creation_time_utc, at(6));
    }

    #[test]
    fn unknown_dismissing_user_defers_the_fault() {
        let missing = map_row::<FaultDataMapper>(&fault(Some("u9")), &references()).unwrap_err();

        assert!(missing.has_entities());
        assert_eq!(missing.to_string(), "user 'u9'");
    }

    #[test]
    fn every_unknown_entity_of_a_row_is_named() {
        let row = AdapterStatusData {
            id: 4,
            geotab_id: "s4".to_owned(),
            date_time: at(2),
            device_id: "b7".to_owned(),
            diagnostic_id: "d9".to_owned(),
            data: Some(1.5),
            record_creation_time_utc: at(2),
        };

        let missing = map_row::<StatusDataMapper>(&row, &references()).unwrap_err();

        assert_eq!(missing.0.len(), 2);
        assert_eq!(missing.to_string(), "device 'b7', diagnostic 'd9'");
    }

    #[test]
    fn dimension_keys_skip_absent_binary_types() {
        let row = AdapterBinaryData {
            id: 1,
            geotab_id: "x1".to_owned(),
            date_time: at(1),
            device_id: "b1".to_owned(),
            binary_type: None,
            controller_id: "c1".to_owned(),
            data: "AQID".to_owned(),
            record_creation_time_utc: at(1),
        };
        let mut keys = DimensionKeys::default();

        BinaryDataMapper::dimension_keys(&row, &mut keys);

        let kinds: Vec<_> = keys.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds, vec![DimensionKind::Controller]);

        let mapped = map_row::<BinaryDataMapper>(&row, &references()).unwrap();
        assert_eq!(mapped.binary_type_id, None);
        assert_eq!(mapped.controller_id, 31);
    }

    #[test]
    fn entity_processors_have_no_prerequisites() {
        assert!(processor_prerequisites(ProcessorId::DeviceProcessor).is_empty());
        assert_eq!(
            processor_prerequisites(ProcessorId::FaultDataProcessor),
            vec![
                ProcessorId::DeviceProcessor,
                ProcessorId::DiagnosticProcessor,
                ProcessorId::UserProcessor,
            ]
        );
    }
}
