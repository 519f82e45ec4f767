//! Search result types.

use std::time::Duration;

use labsearch::EntityId;

use crate::paginator::Pagination;

/// Result of starting a search.
///
/// Holds the pagination over the matching ids and the statistics of the run.
///
/// # Example
///
/// ```ignore
/// let outcome = executor.start_search(&search, None)?;
///
/// println!("Found {} vessels in {:?}", outcome.len(), outcome.stats.total_duration);
///
/// for id in outcome.iter() {
///     println!("Vessel: {}", id);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Ordered ids of the result.
    pub pagination: Pagination,
    /// Execution statistics.
    pub stats: SearchStats,
}

impl SearchOutcome {
    /// Creates a new SearchOutcome.
    pub fn new(pagination: Pagination, stats: SearchStats) -> Self {
        Self { pagination, stats }
    }

    /// Returns the number of matching entities.
    pub fn len(&self) -> usize {
        self.pagination.len()
    }

    /// Returns true if nothing matched.
    pub fn is_empty(&self) -> bool {
        self.pagination.is_empty()
    }

    /// Checks if an entity is in the result.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.pagination.ids().contains(id)
    }

    /// Returns an iterator over the ids in result order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.pagination.ids().iter()
    }
}

impl<'a> IntoIterator for &'a SearchOutcome {
    type Item = &'a EntityId;
    type IntoIter = std::slice::Iter<'a, EntityId>;

    fn into_iter(self) -> Self::IntoIter {
        self.pagination.ids().iter()
    }
}

/// Statistics from one search run.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    /// Time spent compiling (zero on a cache hit).
    pub compile_duration: Duration,
    /// Time spent in the backend projecting the plan.
    pub project_duration: Duration,
    /// Time spent in traversal evaluators.
    pub traversal_duration: Duration,
    /// Whole run.
    pub total_duration: Duration,
    /// Whether the compiled plan came from the cache.
    pub cache_hit: bool,
    /// Entities matched by the plan itself.
    pub initial_count: usize,
    /// Entities added by traversal evaluators.
    pub traversal_count: usize,
}
