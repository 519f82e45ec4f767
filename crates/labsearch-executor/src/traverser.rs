//! Breadth-first traversal of the lineage graph.
//!
//! This module provides [`walk`], the BFS shared by every traversal
//! evaluator, and [`TraversalResult`], its ordered output. Evaluators differ
//! only in the [`TraversalRules`] they pass.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use labsearch::{Direction, EntityId};

use crate::traits::{LineageGraph, Transfer, VesselKind};

// =============================================================================
// Rules
// =============================================================================

/// Which transfer edges are followed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EdgeFilter {
    /// Follow every edge.
    #[default]
    All,
    /// Follow only transfers made by one of these events.
    EventTypes(Vec<String>),
}

impl EdgeFilter {
    fn follows(&self, transfer: &Transfer) -> bool {
        match self {
            EdgeFilter::All => true,
            EdgeFilter::EventTypes(types) => types.iter().any(|t| t == &transfer.event_type),
        }
    }
}

/// Which visited vessels end up in the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RetainRule {
    /// Keep every visited vessel.
    #[default]
    All,
    /// Keep vessels of these kinds.
    VesselKinds(Vec<VesselKind>),
    /// Keep vessels reached through a transfer made by one of these events.
    ReachedByEvent(Vec<String>),
}

impl RetainRule {
    fn retains(&self, graph: &dyn LineageGraph, vessel: &EntityId, via: &Transfer) -> bool {
        match self {
            RetainRule::All => true,
            RetainRule::VesselKinds(kinds) => graph
                .vessel_kind(vessel)
                .is_some_and(|kind| kinds.contains(&kind)),
            RetainRule::ReachedByEvent(types) => types.iter().any(|t| t == &via.event_type),
        }
    }
}

/// Order of entries in a [`TraversalResult`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultOrdering {
    /// Increasing hop count, then discovery order.
    #[default]
    ByHop,
    /// Increasing entity key.
    ByKey,
}

/// Parameters of one [`walk`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalRules {
    /// Edges followed.
    pub edges: EdgeFilter,
    /// Vessels kept.
    pub retain: RetainRule,
    /// Do not walk past a retained vessel.
    pub stop_at_first_match: bool,
    /// Output order.
    pub ordering: ResultOrdering,
}

impl TraversalRules {
    /// Walk and keep everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the edge filter.
    pub fn with_edges(mut self, edges: EdgeFilter) -> Self {
        self.edges = edges;
        self
    }

    /// Sets the retain rule.
    pub fn with_retain(mut self, retain: RetainRule) -> Self {
        self.retain = retain;
        self
    }

    /// Stops descending past retained vessels.
    pub fn with_stop_at_first_match(mut self, stop: bool) -> Self {
        self.stop_at_first_match = stop;
        self
    }

    /// Sets the output order.
    pub fn with_ordering(mut self, ordering: ResultOrdering) -> Self {
        self.ordering = ordering;
        self
    }
}

// =============================================================================
// Result
// =============================================================================

/// One vessel found by a traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalEntry {
    /// Discovered vessel.
    pub entity: EntityId,
    /// Minimum number of transfers from any start.
    pub hop_count: usize,
    /// Start vessel on the shortest path to it.
    pub origin: EntityId,
}

/// Ordered, de-duplicated output of a traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalResult {
    entries: Vec<TraversalEntry>,
    index: HashMap<EntityId, usize>,
}

impl TraversalResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a discovery, keeping the minimum hop count and its origin.
    ///
    /// On a tie the earlier origin stays.
    pub fn record(&mut self, entity: EntityId, hop_count: usize, origin: &EntityId) {
        match self.index.get(&entity) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                if hop_count < entry.hop_count {
                    entry.hop_count = hop_count;
                    entry.origin = origin.clone();
                }
            }
            None => {
                self.index.insert(entity.clone(), self.entries.len());
                self.entries.push(TraversalEntry {
                    entity,
                    hop_count,
                    origin: origin.clone(),
                });
            }
        }
    }

    /// Appends the entries of `other`; vessels in both keep the shorter path.
    pub fn merge(&mut self, other: TraversalResult) {
        for entry in other.entries {
            self.record(entry.entity, entry.hop_count, &entry.origin);
        }
    }

    /// Entries in result order.
    pub fn entries(&self) -> &[TraversalEntry] {
        &self.entries
    }

    /// Entity keys in result order.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entries.iter().map(|e| e.entity.clone()).collect()
    }

    /// Entity keys grouped by hop count.
    pub fn grouped_by_hop(&self) -> BTreeMap<usize, Vec<EntityId>> {
        let mut groups: BTreeMap<usize, Vec<EntityId>> = BTreeMap::new();
        for entry in &self.entries {
            groups
                .entry(entry.hop_count)
                .or_default()
                .push(entry.entity.clone());
        }
        groups
    }

    /// Start vessel that produced `entity`.
    pub fn origin_of(&self, entity: &EntityId) -> Option<&EntityId> {
        self.index.get(entity).map(|&i| &self.entries[i].origin)
    }

    /// Hop count of `entity`.
    pub fn hop_count(&self, entity: &EntityId) -> Option<usize> {
        self.index.get(entity).map(|&i| self.entries[i].hop_count)
    }

    /// Returns true if `entity` was found.
    pub fn contains(&self, entity: &EntityId) -> bool {
        self.index.contains_key(entity)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was found.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sort(&mut self, ordering: ResultOrdering) {
        match ordering {
            ResultOrdering::ByHop => self.entries.sort_by_key(|e| e.hop_count),
            ResultOrdering::ByKey => self.entries.sort_by(|a, b| a.entity.cmp(&b.entity)),
        }
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.entity.clone(), i))
            .collect();
    }
}

impl IntoIterator for TraversalResult {
    type Item = TraversalEntry;
    type IntoIter = std::vec::IntoIter<TraversalEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a TraversalResult {
    type Item = &'a TraversalEntry;
    type IntoIter = std::slice::Iter<'a, TraversalEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// =============================================================================
// Walk
// =============================================================================

/// Walks the graph from every start and merges the results.
///
/// Each start gets its own BFS with a fresh expanded set, so cycles terminate
/// and one start never hides vessels from another. A start is never part of
/// its own result.
///
/// A vessel is kept if any followed transfer reaching it is retained, not
/// only the first one walked. Each vessel is expanded at most once; with
/// `stop_at_first_match` a retaining transfer does not expand it, but another
/// transfer reaching it still may.
///
/// # Example
///
/// ```rust
/// use labsearch::{Direction, EntityId};
/// use labsearch_executor::{walk, LineageGraph, Transfer, TraversalRules, VesselKind};
///
/// struct Chain;
///
/// impl LineageGraph for Chain {
///     fn transfers_from(&self, id: &EntityId) -> Vec<Transfer> {
///         match id {
///             EntityId::Long(n) if *n < 3 => vec![Transfer::new(*n, *n + 1, "Transfer")],
///             _ => Vec::new(),
///         }
///     }
///     fn transfers_to(&self, _id: &EntityId) -> Vec<Transfer> {
///         Vec::new()
///     }
///     fn vessel_kind(&self, _id: &EntityId) -> Option<VesselKind> {
///         None
///     }
/// }
///
/// let result = walk(&Chain, &[EntityId::Long(1)], Direction::Descendants, &TraversalRules::new());
/// assert_eq!(result.entity_ids(), vec![EntityId::Long(2), EntityId::Long(3)]);
/// assert_eq!(result.hop_count(&EntityId::Long(3)), Some(2));
/// ```
pub fn walk(
    graph: &dyn LineageGraph,
    starts: &[EntityId],
    direction: Direction,
    rules: &TraversalRules,
) -> TraversalResult {
    let mut result = TraversalResult::new();

    for start in starts {
        let mut expanded = HashSet::with_capacity(64);
        let mut queue = VecDeque::with_capacity(32);
        expanded.insert(start.clone());
        queue.push_back((start.clone(), 0usize));

        while let Some((current, hops)) = queue.pop_front() {
            let edges = match direction {
                Direction::Descendants => graph.transfers_from(&current),
                Direction::Ancestors => graph.transfers_to(&current),
            };
            for transfer in edges {
                if !rules.edges.follows(&transfer) {
                    continue;
                }
                let next = match direction {
                    Direction::Descendants => &transfer.target,
                    Direction::Ancestors => &transfer.source,
                };

                let retained = rules.retain.retains(graph, next, &transfer);
                if retained && next != start {
                    result.record(next.clone(), hops + 1, start);
                }
                let stops = retained && rules.stop_at_first_match;
                if !stops && expanded.insert(next.clone()) {
                    queue.push_back((next.clone(), hops + 1));
                }
            }
        }
    }

    result.sort(rules.ordering);
    result
}
