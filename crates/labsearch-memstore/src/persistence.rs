//! Save/load store snapshots as JSON.
//!
//! A snapshot holds every registered entity type with its records, the
//! transfers and the vessel kinds. Literal evaluators are function pointers
//! and are not saved; register them again after loading.
//!
//! # Example
//!
//! ```ignore
//! use labsearch_memstore::InMemoryStore;
//!
//! store.save("fixtures/vessels.json")?;
//!
//! let mut loaded = InMemoryStore::load("fixtures/vessels.json")?;
//! loaded.register_literal("status = 'ACTIVE'", is_active);
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use labsearch::EntityId;
use labsearch_executor::{Transfer, VesselKind};
use serde::{Deserialize, Serialize};

use crate::error::{MemStoreError, MemStoreResult};
use crate::record::Record;
use crate::store::InMemoryStore;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable content of an [`InMemoryStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Format version.
    pub version: u32,
    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,
    /// Version of the crate that wrote it.
    pub writer_version: String,
    /// Entity types with their records.
    pub entities: Vec<EntitySnapshot>,
    /// Vessel transfers.
    #[serde(default)]
    pub transfers: Vec<Transfer>,
    /// Vessel kinds by id.
    #[serde(default)]
    pub vessel_kinds: Vec<(EntityId, VesselKind)>,
}

/// One entity type inside a [`StoreSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity type name.
    pub name: String,
    /// Id property name.
    pub id_property: String,
    /// Records in id order.
    pub records: Vec<Record>,
}

impl InMemoryStore {
    /// Captures the store's content.
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut vessel_kinds: Vec<(EntityId, VesselKind)> = self
            .vessel_kinds
            .iter()
            .map(|(id, kind)| (id.clone(), kind.clone()))
            .collect();
        vessel_kinds.sort_by(|a, b| a.0.cmp(&b.0));

        StoreSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            writer_version: env!("CARGO_PKG_VERSION").to_string(),
            entities: self
                .tables
                .iter()
                .map(|(name, table)| EntitySnapshot {
                    name: name.clone(),
                    id_property: table.id_property.clone(),
                    records: table.records.values().cloned().collect(),
                })
                .collect(),
            transfers: self.transfers.clone(),
            vessel_kinds,
        }
    }

    /// Rebuilds a store from a snapshot, re-checking every record.
    ///
    /// # Errors
    ///
    /// - [`MemStoreError::InvalidFormat`] for an unsupported version
    /// - any error [`InMemoryStore::insert`] reports
    pub fn from_snapshot(snapshot: StoreSnapshot) -> MemStoreResult<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MemStoreError::invalid_format(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        let mut store = InMemoryStore::new();
        for entity in &snapshot.entities {
            store.register_entity(entity.name.clone(), entity.id_property.clone());
        }
        for entity in snapshot.entities {
            for record in entity.records {
                if record.entity != entity.name {
                    return Err(MemStoreError::invalid_format(format!(
                        "record {} of {} listed under {}",
                        record.id, record.entity, entity.name
                    )));
                }
                store.insert(record)?;
            }
        }
        for transfer in snapshot.transfers {
            store.add_transfer(transfer);
        }
        for (id, kind) in snapshot.vessel_kinds {
            store.set_vessel_kind(id, kind);
        }
        Ok(store)
    }

    /// Parses a snapshot from JSON.
    pub fn from_json(json: &str) -> MemStoreResult<Self> {
        let snapshot: StoreSnapshot = serde_json::from_str(json)
            .map_err(|e| MemStoreError::invalid_format(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    /// Serializes a snapshot to JSON.
    pub fn to_json(&self) -> MemStoreResult<String> {
        serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| MemStoreError::SerializationError(e.to_string()))
    }

    /// Saves a snapshot to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MemStoreResult<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| MemStoreError::io_error(path, e))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.snapshot())
            .map_err(|e| MemStoreError::SerializationError(e.to_string()))?;
        tracing::debug!(path = %path.display(), "store snapshot saved");
        Ok(())
    }

    /// Loads a snapshot from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> MemStoreResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| MemStoreError::io_error(path, e))?;
        let reader = BufReader::new(file);
        let snapshot: StoreSnapshot = serde_json::from_reader(reader)
            .map_err(|e| MemStoreError::invalid_format(e.to_string()))?;
        tracing::debug!(
            path = %path.display(),
            saved_at = %snapshot.saved_at,
            entities = snapshot.entities.len(),
            "store snapshot loaded"
        );
        Self::from_snapshot(snapshot)
    }
}
