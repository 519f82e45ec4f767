//! # labsearch-memstore
//!
//! In-memory backend for the `labsearch-executor` crate.
//!
//! [`InMemoryStore`] implements both [`EntityStore`] and [`LineageGraph`],
//! interpreting compiled plans directly against records held in memory. It
//! is meant for tests, fixtures and small embedded datasets.
//!
//! ## Features
//!
//! - **`persistence`** (default): save/load store snapshots as JSON
//! - **`full`**: enable everything
//!
//! ## Quick Start
//!
//! ```rust
//! use labsearch::{CriteriaPath, KeyType, Operator, ResultEntity, SearchInstance, TermCatalog, TermDefinition};
//! use labsearch_executor::SearchExecutor;
//! use labsearch_memstore::{InMemoryStore, Record};
//!
//! let catalog = TermCatalog::builder(ResultEntity::new("LabVessel", "labVesselId", KeyType::Long))
//!     .term(TermDefinition::builder("Barcode").path(CriteriaPath::root("label")))
//!     .build()
//!     .unwrap();
//!
//! let mut store = InMemoryStore::new().with_entity("LabVessel", "labVesselId");
//! store.insert(Record::new("LabVessel", 1).with_field("label", "0123")).unwrap();
//! store.insert(Record::new("LabVessel", 2).with_field("label", "0124")).unwrap();
//!
//! let mut search = SearchInstance::new();
//! let barcode = search.add_top_level_term("Barcode", &catalog).unwrap();
//! search.value_mut(barcode).set_operator(Operator::Equals);
//! search.value_mut(barcode).set_values(["0124"]);
//!
//! let executor = SearchExecutor::new(&catalog, &store);
//! let outcome = executor.start_search(&search, None).unwrap();
//! assert_eq!(outcome.len(), 1);
//! ```
//!
//! [`EntityStore`]: labsearch_executor::EntityStore
//! [`LineageGraph`]: labsearch_executor::LineageGraph

#![warn(missing_docs)]

pub mod error;
mod eval;
pub mod record;
pub mod store;

// Feature-gated modules
#[cfg(feature = "persistence")]
pub mod persistence;

pub use error::{MemStoreError, MemStoreResult};
pub use record::{Record, RecordRef};
pub use store::{InMemoryStore, LiteralFn};

#[cfg(feature = "persistence")]
pub use persistence::{EntitySnapshot, StoreSnapshot, SNAPSHOT_VERSION};
