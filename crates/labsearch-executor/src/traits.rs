//! Traits a backend implements to run searches.
//!
//! This module defines the [`EntityStore`] trait that interprets compiled
//! plans and loads entities, and the [`LineageGraph`] trait that exposes
//! transfer edges for traversal evaluators.
//!
//! # Architecture Note
//!
//! This crate intentionally does NOT depend on any concrete backend. The
//! traits are defined here; implementations live in the consuming crate
//! (see `labsearch-memstore` for an in-memory one).
//!
//! # Example: Implementing LineageGraph
//!
//! ```rust
//! use labsearch::EntityId;
//! use labsearch_executor::{LineageGraph, Transfer, VesselKind};
//!
//! struct Edges(Vec<Transfer>);
//!
//! impl LineageGraph for Edges {
//!     fn transfers_from(&self, id: &EntityId) -> Vec<Transfer> {
//!         self.0.iter().filter(|t| &t.source == id).cloned().collect()
//!     }
//!
//!     fn transfers_to(&self, id: &EntityId) -> Vec<Transfer> {
//!         self.0.iter().filter(|t| &t.target == id).cloned().collect()
//!     }
//!
//!     fn vessel_kind(&self, _id: &EntityId) -> Option<VesselKind> {
//!         Some(VesselKind::Tube)
//!     }
//! }
//!
//! let graph = Edges(vec![Transfer::new(1, 2, "Aliquot")]);
//! assert_eq!(graph.transfers_from(&EntityId::Long(1)).len(), 1);
//! ```

use std::fmt;

use labsearch::EntityId;
use serde::{Deserialize, Serialize};

use crate::error::DataAccessError;
use crate::query::CompiledQuery;

// =============================================================================
// Entity store
// =============================================================================

/// A backend that interprets [`CompiledQuery`] plans.
///
/// # Required Methods
///
/// - [`project_ids`](Self::project_ids) - Distinct ids of matching entities, in plan order
/// - [`project_entities`](Self::project_entities) - Matching entities, in plan order
/// - [`fetch_by_ids`](Self::fetch_by_ids) - Load entities by id, in any order
/// - [`entity_key`](Self::entity_key) - Primary key of a loaded entity
pub trait EntityStore: Send + Sync {
    /// Loaded entity type.
    type Entity: Clone;

    /// Runs the plan and returns distinct ids of matching root entities.
    fn project_ids(&self, query: &CompiledQuery) -> Result<Vec<EntityId>, DataAccessError>;

    /// Runs the plan and returns distinct matching root entities.
    fn project_entities(&self, query: &CompiledQuery)
        -> Result<Vec<Self::Entity>, DataAccessError>;

    /// Loads entities of type `entity` by id.
    ///
    /// Callers never pass more ids than their configured chunk size. Ids
    /// without a row are simply absent from the result.
    fn fetch_by_ids(
        &self,
        entity: &str,
        ids: &[EntityId],
        join_fetch: &[String],
    ) -> Result<Vec<Self::Entity>, DataAccessError>;

    /// Primary key of a loaded entity.
    fn entity_key(&self, entity: &Self::Entity) -> EntityId;
}

// =============================================================================
// Lineage graph
// =============================================================================

/// A directed transfer between two vessels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transfer {
    /// Vessel material left.
    pub source: EntityId,
    /// Vessel material arrived in.
    pub target: EntityId,
    /// Name of the event that made the transfer.
    pub event_type: String,
}

impl Transfer {
    /// Creates a transfer.
    pub fn new(
        source: impl Into<EntityId>,
        target: impl Into<EntityId>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            event_type: event_type.into(),
        }
    }
}

/// Physical kind of a vessel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VesselKind {
    /// A single tube.
    Tube,
    /// One well of a plate.
    PlateWell,
    /// A plate.
    StaticPlate,
    /// A rack holding tubes.
    RackOfTubes,
    /// A strip of tubes.
    StripTube,
    /// A sequencing flow cell.
    FlowCell,
    /// Anything else, by name.
    Other(String),
}

impl fmt::Display for VesselKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VesselKind::Tube => f.write_str("tube"),
            VesselKind::PlateWell => f.write_str("plate_well"),
            VesselKind::StaticPlate => f.write_str("static_plate"),
            VesselKind::RackOfTubes => f.write_str("rack_of_tubes"),
            VesselKind::StripTube => f.write_str("strip_tube"),
            VesselKind::FlowCell => f.write_str("flow_cell"),
            VesselKind::Other(name) => f.write_str(name),
        }
    }
}

/// Transfer edges between vessels, used by traversal evaluators.
///
/// A missing node yields no edges.
pub trait LineageGraph: Send + Sync {
    /// Transfers whose source is `id`.
    fn transfers_from(&self, id: &EntityId) -> Vec<Transfer>;

    /// Transfers whose target is `id`.
    fn transfers_to(&self, id: &EntityId) -> Vec<Transfer>;

    /// Kind of the vessel, if known.
    fn vessel_kind(&self, id: &EntityId) -> Option<VesselKind>;
}
