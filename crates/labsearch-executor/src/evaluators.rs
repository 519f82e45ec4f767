//! Traversal evaluators and their registry.
//!
//! An evaluator is a stateless value that turns a set of starting vessels
//! into the vessels related to them through transfers. All variants share
//! the BFS in [`crate::traverser`] and differ only in their
//! [`TraversalRules`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use labsearch::{ConfigurationError, Direction, EntityId};
use parking_lot::RwLock;

use crate::error::SearchResult;
use crate::traits::{LineageGraph, VesselKind};
use crate::traverser::{walk, EdgeFilter, RetainRule, TraversalResult, TraversalRules};

/// Registry key of the standard ancestor evaluator.
pub const ANCESTORS: &str = "ancestors";
/// Registry key of the standard descendant evaluator.
pub const DESCENDANTS: &str = "descendants";
/// Registry key of the custom vessel-kind evaluator.
pub const VESSEL_KIND: &str = "vessel_kind";

/// Computes vessels related to a set of starting vessels.
pub trait TraversalEvaluator: Send + Sync + fmt::Debug {
    /// Display label.
    fn label(&self) -> &str;

    /// Returns true if the evaluator can walk in `direction`.
    fn supports(&self, direction: Direction) -> bool;

    /// Direction used when the caller does not choose one.
    fn default_direction(&self) -> Direction;

    /// Rules passed to the shared walk.
    fn rules(&self) -> TraversalRules;

    /// Walks the graph from `starts`.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::UnsupportedDirection`] when `direction` is not
    /// supported.
    fn evaluate(
        &self,
        graph: &dyn LineageGraph,
        starts: &[EntityId],
        direction: Direction,
    ) -> SearchResult<TraversalResult> {
        if !self.supports(direction) {
            return Err(ConfigurationError::UnsupportedDirection {
                evaluator: self.label().to_string(),
                direction: direction.to_string(),
            }
            .into());
        }
        let result = walk(graph, starts, direction, &self.rules());
        tracing::debug!(
            evaluator = self.label(),
            %direction,
            starts = starts.len(),
            found = result.len(),
            "traversal evaluated"
        );
        Ok(result)
    }
}

// =============================================================================
// Standard evaluators
// =============================================================================

/// Follows every transfer in one fixed direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageEvaluator {
    label: String,
    direction: Direction,
}

impl LineageEvaluator {
    /// All vessels material came from.
    pub fn ancestors() -> Self {
        Self {
            label: "Ancestors".to_string(),
            direction: Direction::Ancestors,
        }
    }

    /// All vessels material went to.
    pub fn descendants() -> Self {
        Self {
            label: "Descendants".to_string(),
            direction: Direction::Descendants,
        }
    }
}

impl TraversalEvaluator for LineageEvaluator {
    fn label(&self) -> &str {
        &self.label
    }

    fn supports(&self, direction: Direction) -> bool {
        direction == self.direction
    }

    fn default_direction(&self) -> Direction {
        self.direction
    }

    fn rules(&self) -> TraversalRules {
        TraversalRules::new()
    }
}

/// Keeps only vessels of selected kinds, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VesselKindEvaluator {
    label: String,
    kinds: Vec<VesselKind>,
    default_direction: Direction,
}

impl VesselKindEvaluator {
    /// Creates an evaluator retaining `kinds`.
    pub fn new(label: impl Into<String>, kinds: Vec<VesselKind>) -> Self {
        Self {
            label: label.into(),
            kinds,
            default_direction: Direction::Descendants,
        }
    }

    /// Sets the default direction.
    pub fn with_default_direction(mut self, direction: Direction) -> Self {
        self.default_direction = direction;
        self
    }

    /// Kinds retained.
    pub fn kinds(&self) -> &[VesselKind] {
        &self.kinds
    }
}

impl Default for VesselKindEvaluator {
    fn default() -> Self {
        Self::new(
            "Tubes, Strip Tubes and Flow Cells",
            vec![VesselKind::Tube, VesselKind::StripTube, VesselKind::FlowCell],
        )
    }
}

impl TraversalEvaluator for VesselKindEvaluator {
    fn label(&self) -> &str {
        &self.label
    }

    fn supports(&self, _direction: Direction) -> bool {
        true
    }

    fn default_direction(&self) -> Direction {
        self.default_direction
    }

    fn rules(&self) -> TraversalRules {
        TraversalRules::new().with_retain(RetainRule::VesselKinds(self.kinds.clone()))
    }
}

/// Keeps vessels reached through transfers made by selected events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypeEvaluator {
    label: String,
    event_types: Vec<String>,
    only_matching_edges: bool,
    stop_at_first_match: bool,
    default_direction: Direction,
}

impl EventTypeEvaluator {
    /// Creates an evaluator for `event_types`.
    pub fn new<I, S>(label: impl Into<String>, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            event_types: event_types.into_iter().map(Into::into).collect(),
            only_matching_edges: false,
            stop_at_first_match: false,
            default_direction: Direction::Descendants,
        }
    }

    /// Walks only through matching transfers instead of through all of them.
    pub fn with_only_matching_edges(mut self, only: bool) -> Self {
        self.only_matching_edges = only;
        self
    }

    /// Does not walk past the first matching vessel on a path.
    pub fn with_stop_at_first_match(mut self, stop: bool) -> Self {
        self.stop_at_first_match = stop;
        self
    }

    /// Sets the default direction.
    pub fn with_default_direction(mut self, direction: Direction) -> Self {
        self.default_direction = direction;
        self
    }
}

impl TraversalEvaluator for EventTypeEvaluator {
    fn label(&self) -> &str {
        &self.label
    }

    fn supports(&self, _direction: Direction) -> bool {
        true
    }

    fn default_direction(&self) -> Direction {
        self.default_direction
    }

    fn rules(&self) -> TraversalRules {
        let edges = if self.only_matching_edges {
            EdgeFilter::EventTypes(self.event_types.clone())
        } else {
            EdgeFilter::All
        };
        TraversalRules::new()
            .with_edges(edges)
            .with_retain(RetainRule::ReachedByEvent(self.event_types.clone()))
            .with_stop_at_first_match(self.stop_at_first_match)
    }
}

// =============================================================================
// Registry
// =============================================================================

type EvaluatorMap = BTreeMap<String, Arc<dyn TraversalEvaluator>>;

/// Evaluators by key: standard ones ticked as checkboxes, custom ones
/// chosen together with a direction, and alternate ones keyed by the result
/// entity of an alternate catalog. An alternate evaluator maps the ids found
/// in that catalog back to the main result entity.
///
/// Entries are immutable once registered; lookups hand out `Arc`s.
#[derive(Debug, Default)]
pub struct EvaluatorRegistry {
    standard: RwLock<EvaluatorMap>,
    custom: RwLock<EvaluatorMap>,
    alternate: RwLock<EvaluatorMap>,
}

impl EvaluatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the ancestor, descendant and vessel-kind evaluators.
    pub fn with_defaults() -> Self {
        let mut standard = EvaluatorMap::new();
        standard.insert(ANCESTORS.to_string(), Arc::new(LineageEvaluator::ancestors()) as _);
        standard.insert(DESCENDANTS.to_string(), Arc::new(LineageEvaluator::descendants()) as _);
        let mut custom = EvaluatorMap::new();
        custom.insert(VESSEL_KIND.to_string(), Arc::new(VesselKindEvaluator::default()) as _);
        Self {
            standard: RwLock::new(standard),
            custom: RwLock::new(custom),
            alternate: RwLock::new(EvaluatorMap::new()),
        }
    }

    /// Registers a standard evaluator.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::DuplicateEvaluator`] if `key` is taken.
    pub fn register(
        &self,
        key: impl Into<String>,
        evaluator: impl TraversalEvaluator + 'static,
    ) -> Result<(), ConfigurationError> {
        insert(&self.standard, key.into(), Arc::new(evaluator))
    }

    /// Registers a custom evaluator.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::DuplicateEvaluator`] if `key` is taken.
    pub fn register_custom(
        &self,
        key: impl Into<String>,
        evaluator: impl TraversalEvaluator + 'static,
    ) -> Result<(), ConfigurationError> {
        insert(&self.custom, key.into(), Arc::new(evaluator))
    }

    /// Registers the evaluator that maps ids of the alternate entity `entity`
    /// back to the main result entity.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::DuplicateEvaluator`] if `entity` is taken.
    pub fn register_alternate(
        &self,
        entity: impl Into<String>,
        evaluator: impl TraversalEvaluator + 'static,
    ) -> Result<(), ConfigurationError> {
        insert(&self.alternate, entity.into(), Arc::new(evaluator))
    }

    /// Looks up a standard evaluator.
    pub fn get(&self, key: &str) -> Option<Arc<dyn TraversalEvaluator>> {
        self.standard.read().get(key).cloned()
    }

    /// Looks up a custom evaluator.
    pub fn get_custom(&self, key: &str) -> Option<Arc<dyn TraversalEvaluator>> {
        self.custom.read().get(key).cloned()
    }

    /// Looks up the alternate evaluator for `entity`.
    pub fn get_alternate(&self, entity: &str) -> Option<Arc<dyn TraversalEvaluator>> {
        self.alternate.read().get(entity).cloned()
    }

    /// Looks up a standard evaluator, failing if it is missing.
    pub fn require(&self, key: &str) -> Result<Arc<dyn TraversalEvaluator>, ConfigurationError> {
        self.get(key)
            .ok_or_else(|| ConfigurationError::UnknownEvaluator(key.to_string()))
    }

    /// Looks up a custom evaluator, failing if it is missing.
    pub fn require_custom(
        &self,
        key: &str,
    ) -> Result<Arc<dyn TraversalEvaluator>, ConfigurationError> {
        self.get_custom(key)
            .ok_or_else(|| ConfigurationError::UnknownEvaluator(key.to_string()))
    }

    /// Looks up the alternate evaluator for `entity`, failing if it is missing.
    pub fn require_alternate(
        &self,
        entity: &str,
    ) -> Result<Arc<dyn TraversalEvaluator>, ConfigurationError> {
        self.get_alternate(entity)
            .ok_or_else(|| ConfigurationError::UnknownEvaluator(entity.to_string()))
    }

    /// Standard keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.standard.read().keys().cloned().collect()
    }

    /// Custom keys in sorted order.
    pub fn custom_keys(&self) -> Vec<String> {
        self.custom.read().keys().cloned().collect()
    }
}

fn insert(
    map: &RwLock<EvaluatorMap>,
    key: String,
    evaluator: Arc<dyn TraversalEvaluator>,
) -> Result<(), ConfigurationError> {
    let mut map = map.write();
    if map.contains_key(&key) {
        return Err(ConfigurationError::DuplicateEvaluator(key));
    }
    tracing::debug!(key = %key, label = evaluator.label(), "registered traversal evaluator");
    map.insert(key, evaluator);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchExecutorError;
    use crate::traits::Transfer;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockGraph {
        edges: Vec<Transfer>,
        kinds: HashMap<EntityId, VesselKind>,
    }

    impl LineageGraph for MockGraph {
        fn transfers_from(&self, id: &EntityId) -> Vec<Transfer> {
            self.edges.iter().filter(|t| &t.source == id).cloned().collect()
        }

        fn transfers_to(&self, id: &EntityId) -> Vec<Transfer> {
            self.edges.iter().filter(|t| &t.target == id).cloned().collect()
        }

        fn vessel_kind(&self, id: &EntityId) -> Option<VesselKind> {
            self.kinds.get(id).cloned()
        }
    }

    /// plate(1) -> well(2) -> tube(3) -> flow cell(4)
    fn create_graph() -> MockGraph {
        let mut graph = MockGraph::default();
        graph.edges.push(Transfer::new(1, 2, "PlateTransfer"));
        graph.edges.push(Transfer::new(2, 3, "Pool"));
        graph.edges.push(Transfer::new(3, 4, "Denature"));
        graph.kinds.insert(EntityId::Long(1), VesselKind::StaticPlate);
        graph.kinds.insert(EntityId::Long(2), VesselKind::PlateWell);
        graph.kinds.insert(EntityId::Long(3), VesselKind::Tube);
        graph.kinds.insert(EntityId::Long(4), VesselKind::FlowCell);
        graph
    }

    fn ids(values: &[i64]) -> Vec<EntityId> {
        values.iter().map(|v| EntityId::Long(*v)).collect()
    }

    #[test]
    fn test_lineage_evaluators() {
        let graph = create_graph();
        let down = LineageEvaluator::descendants()
            .evaluate(&graph, &ids(&[1]), Direction::Descendants)
            .unwrap();
        assert_eq!(down.entity_ids(), ids(&[2, 3, 4]));

        let up = LineageEvaluator::ancestors()
            .evaluate(&graph, &ids(&[4]), Direction::Ancestors)
            .unwrap();
        assert_eq!(up.entity_ids(), ids(&[3, 2, 1]));
    }

    #[test]
    fn test_lineage_rejects_other_direction() {
        let graph = create_graph();
        let err = LineageEvaluator::ancestors()
            .evaluate(&graph, &ids(&[4]), Direction::Descendants)
            .unwrap_err();
        assert!(matches!(
            err,
            SearchExecutorError::Configuration(ConfigurationError::UnsupportedDirection { .. })
        ));
    }

    #[test]
    fn test_vessel_kind_default_kinds() {
        let graph = create_graph();
        let evaluator = VesselKindEvaluator::default();
        assert!(evaluator.supports(Direction::Ancestors));
        let result = evaluator
            .evaluate(&graph, &ids(&[1]), evaluator.default_direction())
            .unwrap();
        assert_eq!(result.entity_ids(), ids(&[3, 4]));

        let up = evaluator.evaluate(&graph, &ids(&[4]), Direction::Ancestors).unwrap();
        assert_eq!(up.entity_ids(), ids(&[3]));
    }

    #[test]
    fn test_event_type_evaluator() {
        let graph = create_graph();
        let evaluator = EventTypeEvaluator::new("Pooled", ["Pool"]);
        let result = evaluator.evaluate(&graph, &ids(&[1]), Direction::Descendants).unwrap();
        assert_eq!(result.entity_ids(), ids(&[3]));

        // Walking up, the source of the pool transfer is the match.
        let up = evaluator.evaluate(&graph, &ids(&[4]), Direction::Ancestors).unwrap();
        assert_eq!(up.entity_ids(), ids(&[2]));
    }

    #[test]
    fn test_event_type_only_matching_edges() {
        let graph = create_graph();
        let evaluator = EventTypeEvaluator::new("Pooled", ["Pool"]).with_only_matching_edges(true);
        let result = evaluator.evaluate(&graph, &ids(&[1]), Direction::Descendants).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_registry_defaults() {
        let registry = EvaluatorRegistry::with_defaults();
        assert_eq!(registry.keys(), vec![ANCESTORS.to_string(), DESCENDANTS.to_string()]);
        assert_eq!(registry.custom_keys(), vec![VESSEL_KIND.to_string()]);
        assert_eq!(registry.get(ANCESTORS).unwrap().label(), "Ancestors");
        assert!(registry.get(VESSEL_KIND).is_none());
        assert!(registry.get_custom(VESSEL_KIND).is_some());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let registry = EvaluatorRegistry::with_defaults();
        let err = registry
            .register(ANCESTORS, LineageEvaluator::ancestors())
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateEvaluator(ANCESTORS.to_string()));

        registry
            .register_custom("pooled", EventTypeEvaluator::new("Pooled", ["Pool"]))
            .unwrap();
        assert!(registry
            .register_custom("pooled", EventTypeEvaluator::new("Pooled", ["Pool"]))
            .is_err());
    }

    #[test]
    fn test_registry_require_unknown() {
        let registry = EvaluatorRegistry::new();
        assert_eq!(
            registry.require("nope").unwrap_err(),
            ConfigurationError::UnknownEvaluator("nope".to_string())
        );
        assert!(registry.require_custom("nope").is_err());
    }

    #[test]
    fn test_registry_shared_across_threads() {
        let registry = Arc::new(EvaluatorRegistry::with_defaults());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .register_custom(format!("custom{}", i), VesselKindEvaluator::default())
                        .unwrap();
                    assert!(registry.get(DESCENDANTS).is_some());
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("Thread panicked");
        }
        assert_eq!(registry.custom_keys().len(), 5);
    }
}
