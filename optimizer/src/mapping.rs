//! Translation of Adapter rows into Optimizer rows.
//!
//! Natural-key references are resolved to surrogate ids through the caches. Two kinds of
//! references exist: entities (devices, diagnostics, users) are migrated by their own processor,
//! so a row referencing an unknown entity is deferred until it shows up. Dimensions
//! (controllers, binary types, driver change types) have no processor and are created on first
//! reference before mapping.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::cache::id::IdMap;
use crate::types::{SourceRecord, TargetRecord, TargetTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Device,
    Diagnostic,
    User,
}

impl EntityKind {
    pub fn table(&self) -> TargetTable {
        match self {
            EntityKind::Device => TargetTable::Devices,
            EntityKind::Diagnostic => TargetTable::Diagnostics,
            EntityKind::User => TargetTable::Users,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Device => "device",
            EntityKind::Diagnostic => "diagnostic",
            EntityKind::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DimensionKind {
    BinaryType,
    Controller,
    DriverChangeType,
}

impl DimensionKind {
    pub fn table(&self) -> TargetTable {
        match self {
            DimensionKind::BinaryType => TargetTable::BinaryTypes,
            DimensionKind::Controller => TargetTable::Controllers,
            DimensionKind::DriverChangeType => TargetTable::DriverChangeTypes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::BinaryType => "binary type",
            DimensionKind::Controller => "controller",
            DimensionKind::DriverChangeType => "driver change type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Entity(EntityKind),
    Dimension(DimensionKind),
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Entity(kind) => kind.as_str(),
            ReferenceKind::Dimension(kind) => kind.as_str(),
        }
    }
}

/// A natural key that has no row in the Optimizer database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReference {
    pub kind: ReferenceKind,
    pub geotab_id: String,
}

/// Every reference of one row that could not be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingReferences(pub Vec<MissingReference>);

impl MissingReferences {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any missing reference is an entity, which only its processor can create.
    pub fn has_entities(&self) -> bool {
        self.0
            .iter()
            .any(|missing| matches!(missing.kind, ReferenceKind::Entity(_)))
    }
}

impl fmt::Display for MissingReferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, missing) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} '{}'", missing.kind.as_str(), missing.geotab_id)?;
        }

        Ok(())
    }
}

/// Dimension keys referenced by a batch, grouped by dimension.
#[derive(Debug, Clone, Default)]
pub struct DimensionKeys(BTreeMap<DimensionKind, BTreeSet<String>>);

impl DimensionKeys {
    pub fn add(&mut self, kind: DimensionKind, key: &str) {
        self.0.entry(kind).or_default().insert(key.to_owned());
    }

    pub fn add_optional(&mut self, kind: DimensionKind, key: Option<&str>) {
        if let Some(key) = key {
            self.add(kind, key);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DimensionKind, &BTreeSet<String>)> {
        self.0.iter()
    }
}

/// Id maps available while mapping one batch.
#[derive(Debug, Clone, Default)]
pub struct References {
    entities: HashMap<EntityKind, Arc<IdMap>>,
    dimensions: HashMap<DimensionKind, IdMap>,
}

impl References {
    pub fn with_entities(&mut self, kind: EntityKind, ids: Arc<IdMap>) -> &mut Self {
        self.entities.insert(kind, ids);
        self
    }

    pub fn with_dimensions(&mut self, kind: DimensionKind, ids: IdMap) -> &mut Self {
        self.dimensions.insert(kind, ids);
        self
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver {
            references: self,
            missing: Vec::new(),
        }
    }
}

/// Resolves the references of a single row and remembers every miss.
///
/// Mappers look up all references before bailing out on the first miss, so the warning for a
/// deferred row lists everything it is waiting for.
#[derive(Debug)]
pub struct Resolver<'a> {
    references: &'a References,
    missing: Vec<MissingReference>,
}

impl Resolver<'_> {
    pub fn entity(&mut self, kind: EntityKind, geotab_id: &str) -> Option<i64> {
        let id = self
            .references
            .entities
            .get(&kind)
            .and_then(|ids| ids.get(geotab_id))
            .copied();

        if id.is_none() {
            self.miss(ReferenceKind::Entity(kind), geotab_id);
        }

        id
    }

    /// Resolves a nullable reference. `Some(None)` means there was nothing to resolve.
    pub fn optional_entity(&mut self, kind: EntityKind, geotab_id: Option<&str>) -> Option<Option<i64>> {
        match geotab_id {
            Some(geotab_id) => self.entity(kind, geotab_id).map(Some),
            None => Some(None),
        }
    }

    pub fn dimension(&mut self, kind: DimensionKind, key: &str) -> Option<i64> {
        let id = self
            .references
            .dimensions
            .get(&kind)
            .and_then(|ids| ids.get(key))
            .copied();

        if id.is_none() {
            self.miss(ReferenceKind::Dimension(kind), key);
        }

        id
    }

    pub fn optional_dimension(&mut self, kind: DimensionKind, key: Option<&str>) -> Option<Option<i64>> {
        match key {
            Some(key) => self.dimension(kind, key).map(Some),
            None => Some(None),
        }
    }

    fn miss(&mut self, kind: ReferenceKind, geotab_id: &str) {
        self.missing.push(MissingReference {
            kind,
            geotab_id: geotab_id.to_owned(),
        });
    }

    /// Returns the mapped row, or every reference that was missing.
    pub fn finish<T>(self, mapped: Option<T>) -> Result<T, MissingReferences> {
        match mapped {
            Some(mapped) if self.missing.is_empty() => Ok(mapped),
            _ => Err(MissingReferences(self.missing)),
        }
    }
}

/// Maps rows of one Adapter table to rows of one Optimizer table.
pub trait EntityMapper: Send + Sync + 'static {
    type Source: SourceRecord;

    type Target: TargetRecord;

    /// Entity caches the mapper resolves references through.
    const ENTITIES: &'static [EntityKind];

    /// Dimension caches the mapper resolves references through.
    const DIMENSIONS: &'static [DimensionKind] = &[];

    /// Collects the dimension keys `source` references.
    fn dimension_keys(_source: &Self::Source, _keys: &mut DimensionKeys) {}

    /// Maps `source`, resolving references through `resolver`. Returns `None` when a reference
    /// is missing.
    fn map(source: &Self::Source, resolver: &mut Resolver<'_>) -> Option<Self::Target>;
}

/// Maps one row and reports missing references.
pub fn map_row<M: EntityMapper>(
    source: &M::Source,
    references: &References,
) -> Result<M::Target, MissingReferences> {
    let mut resolver = references.resolver();
    let mapped = M::map(source, &mut resolver);

    resolver.finish(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn references() -> References {
        let mut references = References::default();
        references
            .with_entities(
                EntityKind::Device,
                Arc::new(HashMap::from([("b1".to_owned(), 10)])),
            )
            .with_dimensions(
                DimensionKind::Controller,
                HashMap::from([("c1".to_owned(), 7)]),
            );
        references
    }

    #[test]
    fn every_missing_reference_is_reported() {
        let references = references();
        let mut resolver = references.resolver();

        let device = resolver.entity(EntityKind::Device, "b2");
        let diagnostic = resolver.entity(EntityKind::Diagnostic, "d1");
        let controller = resolver.dimension(DimensionKind::Controller, "c1");
        let mapped = device.zip(diagnostic).zip(controller);

        let missing = resolver.finish(mapped).unwrap_err();
        assert_eq!(missing.to_string(), "device 'b2', diagnostic 'd1'");
        assert!(missing.has_entities());
    }

    #[test]
    fn absent_optional_references_resolve_to_null() {
        let references = references();
        let mut resolver = references.resolver();

        let user = resolver.optional_entity(EntityKind::User, None);
        let device = resolver.entity(EntityKind::Device, "b1");

        assert_eq!(resolver.finish(user.zip(device)), Ok((None, 10)));
    }
}
