//! In-memory entity store and lineage graph.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use labsearch::{EntityId, KeyType, Value};
use labsearch_executor::{
    CompiledQuery, DataAccessError, EntityStore, LineageGraph, Transfer, VesselKind,
};

use crate::error::{MemStoreError, MemStoreResult};
use crate::eval::PlanEvaluator;
use crate::record::{Record, RecordRef};

/// Evaluator for a literal restriction, applied to the scope's own record.
pub type LiteralFn = fn(&Record) -> bool;

#[derive(Debug, Clone)]
pub(crate) struct EntityTable {
    pub(crate) id_property: String,
    pub(crate) key_type: Option<KeyType>,
    pub(crate) records: BTreeMap<EntityId, Record>,
}

/// Entity store and lineage graph backed by plain collections.
///
/// Plans are interpreted with SQL semantics: inner joins multiply rows,
/// left joins keep rows without a target, a missing property makes a
/// comparison unknown, and a root record matches when any of its rows
/// satisfies every condition. Literal restrictions need a registered
/// [`LiteralFn`].
///
/// # Example
///
/// ```rust
/// use labsearch_memstore::{InMemoryStore, Record};
///
/// let mut store = InMemoryStore::new()
///     .with_entity("LabVessel", "labVesselId")
///     .with_entity("MercurySample", "mercurySampleId");
///
/// store.insert(Record::new("LabVessel", 1).with_field("label", "0123")).unwrap();
/// assert_eq!(store.len("LabVessel"), 1);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    pub(crate) tables: BTreeMap<String, EntityTable>,
    pub(crate) literals: HashMap<String, LiteralFn>,
    pub(crate) transfers: Vec<Transfer>,
    pub(crate) vessel_kinds: HashMap<EntityId, VesselKind>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type and its id property.
    pub fn with_entity(mut self, name: impl Into<String>, id_property: impl Into<String>) -> Self {
        self.register_entity(name, id_property);
        self
    }

    /// Registers an entity type; re-registering keeps existing records.
    pub fn register_entity(&mut self, name: impl Into<String>, id_property: impl Into<String>) {
        let id_property = id_property.into();
        self.tables
            .entry(name.into())
            .and_modify(|table| table.id_property = id_property.clone())
            .or_insert_with(|| EntityTable {
                id_property,
                key_type: None,
                records: BTreeMap::new(),
            });
    }

    /// Registers the evaluator for a literal restriction text.
    pub fn register_literal(&mut self, text: impl Into<String>, evaluator: LiteralFn) {
        self.literals.insert(text.into(), evaluator);
    }

    /// Adds a record.
    ///
    /// # Errors
    ///
    /// - [`MemStoreError::UnknownEntity`] if the entity type is not registered
    /// - [`MemStoreError::DuplicateRecord`] if the id is taken
    /// - [`MemStoreError::KeyTypeMismatch`] if the key type differs from earlier records
    pub fn insert(&mut self, record: Record) -> MemStoreResult<()> {
        let table = self
            .tables
            .get_mut(&record.entity)
            .ok_or_else(|| MemStoreError::UnknownEntity(record.entity.clone()))?;

        let key_type = record.id.key_type();
        match table.key_type {
            Some(existing) if existing != key_type => {
                return Err(MemStoreError::KeyTypeMismatch {
                    entity: record.entity.clone(),
                    id: record.id.clone(),
                });
            }
            _ => table.key_type = Some(key_type),
        }
        if table.records.contains_key(&record.id) {
            return Err(MemStoreError::DuplicateRecord {
                entity: record.entity.clone(),
                id: record.id.clone(),
            });
        }
        table.records.insert(record.id.clone(), record);
        Ok(())
    }

    /// Records a transfer between two vessels.
    pub fn add_transfer(&mut self, transfer: Transfer) {
        self.transfers.push(transfer);
    }

    /// Sets the kind of a vessel.
    pub fn set_vessel_kind(&mut self, id: impl Into<EntityId>, kind: VesselKind) {
        self.vessel_kinds.insert(id.into(), kind);
    }

    /// Returns a record.
    pub fn get(&self, entity: &str, id: &EntityId) -> Option<&Record> {
        self.tables.get(entity)?.records.get(id)
    }

    /// Follows a reference.
    pub fn resolve(&self, reference: &RecordRef) -> Option<&Record> {
        self.get(&reference.entity, &reference.id)
    }

    /// Number of records of an entity type.
    pub fn len(&self, entity: &str) -> usize {
        self.tables.get(entity).map_or(0, |t| t.records.len())
    }

    /// True when no entity type holds records.
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|t| t.records.is_empty())
    }

    /// Registered entity types, in name order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Id property of an entity type.
    pub fn id_property(&self, entity: &str) -> Option<&str> {
        self.tables.get(entity).map(|t| t.id_property.as_str())
    }

    /// Records of an entity type, in id order.
    pub(crate) fn records(&self, entity: &str) -> MemStoreResult<impl Iterator<Item = &Record>> {
        self.tables
            .get(entity)
            .map(|t| t.records.values())
            .ok_or_else(|| MemStoreError::UnknownEntity(entity.to_string()))
    }

    /// A property of a record; the id property is answered from the key.
    pub(crate) fn property(&self, record: &Record, name: &str) -> Option<Value> {
        match self.tables.get(&record.entity) {
            Some(table) if table.id_property == name => Some(record.id.to_value()),
            _ => record.field(name).cloned(),
        }
    }

    pub(crate) fn literal(&self, text: &str) -> MemStoreResult<LiteralFn> {
        self.literals
            .get(text)
            .copied()
            .ok_or_else(|| MemStoreError::UnknownLiteral(text.to_string()))
    }

    fn matching<'a>(&'a self, query: &'a CompiledQuery) -> MemStoreResult<Vec<&'a Record>> {
        let records = PlanEvaluator::new(self, query)?.root_records()?;
        tracing::debug!(
            entity = %query.entity().name,
            scopes = query.scopes().len(),
            matched = records.len(),
            "in-memory plan evaluated"
        );
        Ok(records)
    }
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<&str, usize> = self
            .tables
            .iter()
            .map(|(name, table)| (name.as_str(), table.records.len()))
            .collect();
        let mut literals: Vec<&str> = self.literals.keys().map(String::as_str).collect();
        literals.sort_unstable();
        f.debug_struct("InMemoryStore")
            .field("records", &counts)
            .field("literals", &literals)
            .field("transfers", &self.transfers.len())
            .finish()
    }
}

impl EntityStore for InMemoryStore {
    type Entity = Record;

    fn project_ids(&self, query: &CompiledQuery) -> Result<Vec<EntityId>, DataAccessError> {
        Ok(self
            .matching(query)?
            .into_iter()
            .map(|r| r.id.clone())
            .collect())
    }

    fn project_entities(&self, query: &CompiledQuery) -> Result<Vec<Record>, DataAccessError> {
        Ok(self.matching(query)?.into_iter().cloned().collect())
    }

    fn fetch_by_ids(
        &self,
        entity: &str,
        ids: &[EntityId],
        join_fetch: &[String],
    ) -> Result<Vec<Record>, DataAccessError> {
        if !join_fetch.is_empty() {
            tracing::trace!(?join_fetch, "fetch hints ignored by in-memory store");
        }
        let wanted: HashSet<&EntityId> = ids.iter().collect();
        // Rows come back in key order, like an unordered IN lookup would.
        Ok(self
            .records(entity)?
            .filter(|r| wanted.contains(&r.id))
            .cloned()
            .collect())
    }

    fn entity_key(&self, entity: &Record) -> EntityId {
        entity.id.clone()
    }
}

impl LineageGraph for InMemoryStore {
    fn transfers_from(&self, id: &EntityId) -> Vec<Transfer> {
        self.transfers
            .iter()
            .filter(|t| &t.source == id)
            .cloned()
            .collect()
    }

    fn transfers_to(&self, id: &EntityId) -> Vec<Transfer> {
        self.transfers
            .iter()
            .filter(|t| &t.target == id)
            .cloned()
            .collect()
    }

    fn vessel_kind(&self, id: &EntityId) -> Option<VesselKind> {
        self.vessel_kinds.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new().with_entity("LabVessel", "labVesselId");
        store.insert(Record::new("LabVessel", 2).with_field("label", "B")).unwrap();
        store.insert(Record::new("LabVessel", 1).with_field("label", "A")).unwrap();
        store
    }

    #[test]
    fn test_insert_and_get() {
        let store = store();
        assert_eq!(store.len("LabVessel"), 2);
        assert!(!store.is_empty());
        let record = store.get("LabVessel", &EntityId::Long(1)).unwrap();
        assert_eq!(record.field("label"), Some(&Value::from("A")));
        assert_eq!(store.id_property("LabVessel"), Some("labVesselId"));
    }

    #[test]
    fn test_insert_unknown_entity() {
        let mut store = store();
        let err = store.insert(Record::new("Bucket", 1)).unwrap_err();
        assert!(matches!(err, MemStoreError::UnknownEntity(name) if name == "Bucket"));
    }

    #[test]
    fn test_insert_duplicate() {
        let mut store = store();
        let err = store.insert(Record::new("LabVessel", 1)).unwrap_err();
        assert!(matches!(err, MemStoreError::DuplicateRecord { .. }));
    }

    #[test]
    fn test_insert_key_type_mismatch() {
        let mut store = store();
        let err = store.insert(Record::new("LabVessel", "X")).unwrap_err();
        assert!(matches!(err, MemStoreError::KeyTypeMismatch { .. }));
    }

    #[test]
    fn test_id_property_answered_from_key() {
        let store = store();
        let record = store.get("LabVessel", &EntityId::Long(2)).unwrap();
        assert_eq!(store.property(record, "labVesselId"), Some(Value::Long(2)));
        assert_eq!(store.property(record, "label"), Some(Value::from("B")));
    }

    #[test]
    fn test_fetch_by_ids_returns_key_order() {
        let store = store();
        let fetched = store
            .fetch_by_ids("LabVessel", &[EntityId::Long(2), EntityId::Long(1), EntityId::Long(9)], &[])
            .unwrap();
        let ids: Vec<EntityId> = fetched.iter().map(|r| store.entity_key(r)).collect();
        assert_eq!(ids, vec![EntityId::Long(1), EntityId::Long(2)]);
    }

    #[test]
    fn test_fetch_unknown_entity_is_data_access_error() {
        let store = store();
        let err = store.fetch_by_ids("Bucket", &[EntityId::Long(1)], &[]).unwrap_err();
        assert!(err.message().contains("Bucket"));
    }

    #[test]
    fn test_lineage_graph() {
        let mut store = store();
        store.add_transfer(Transfer::new(1, 2, "Aliquot"));
        store.set_vessel_kind(2, VesselKind::Tube);

        assert_eq!(store.transfers_from(&EntityId::Long(1)).len(), 1);
        assert_eq!(store.transfers_to(&EntityId::Long(2)).len(), 1);
        assert!(store.transfers_to(&EntityId::Long(1)).is_empty());
        assert_eq!(store.vessel_kind(&EntityId::Long(2)), Some(VesselKind::Tube));
        assert_eq!(store.vessel_kind(&EntityId::Long(1)), None);
    }

    #[test]
    fn test_debug_lists_counts() {
        let debug = format!("{:?}", store());
        assert!(debug.contains("LabVessel"));
    }
}
