//! Search executor implementation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use labsearch::{ConfigurationError, Direction, EntityId, OrderSpec, SearchInstance, TermCatalog};

use crate::cache::{plan_cache_key, PlanCache};
use crate::compiler::Compiler;
use crate::config::SearchConfig;
use crate::error::SearchResult;
use crate::evaluators::{EvaluatorRegistry, TraversalEvaluator};
use crate::paginator::{Pagination, Paginator};
use crate::query::CompiledQuery;
use crate::result::{SearchOutcome, SearchStats};
use crate::traits::{EntityStore, LineageGraph, Transfer, VesselKind};
use crate::traverser::TraversalResult;

/// Main search engine.
///
/// The executor ties one [`TermCatalog`], one [`EntityStore`], an optional
/// [`LineageGraph`] and an [`EvaluatorRegistry`] together to run searches.
///
/// # Example
///
/// ```ignore
/// use labsearch_executor::{SearchConfig, SearchExecutor};
///
/// // Assumes MyStore implements EntityStore
/// let store = MyStore::new();
/// let executor = SearchExecutor::new(&catalog, &store);
///
/// let outcome = executor.start_search(&search, None)?;
/// println!("Found {} vessels", outcome.len());
///
/// let first_page = executor.get_page(&outcome.pagination, 0)?;
/// ```
pub struct SearchExecutor<'a, S: EntityStore> {
    catalog: &'a TermCatalog,
    store: &'a S,
    graph: Option<&'a dyn LineageGraph>,
    registry: Arc<EvaluatorRegistry>,
    config: SearchConfig,
    cache: Option<Arc<PlanCache>>,
}

impl<'a, S: EntityStore> SearchExecutor<'a, S> {
    /// Creates an executor with default configuration and the default evaluators.
    pub fn new(catalog: &'a TermCatalog, store: &'a S) -> Self {
        Self::with_config(catalog, store, SearchConfig::default())
    }

    /// Creates an executor with custom configuration.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = SearchConfig::builder()
    ///     .with_cache(CacheConfig::default())
    ///     .with_page_size(50)
    ///     .build()?;
    ///
    /// let executor = SearchExecutor::with_config(&catalog, &store, config);
    /// ```
    pub fn with_config(catalog: &'a TermCatalog, store: &'a S, config: SearchConfig) -> Self {
        let cache = config.cache.as_ref().map(|c| Arc::new(PlanCache::new(c)));
        Self {
            catalog,
            store,
            graph: None,
            registry: Arc::new(EvaluatorRegistry::with_defaults()),
            config,
            cache,
        }
    }

    /// Sets the lineage graph used by traversal evaluators.
    pub fn with_graph(mut self, graph: &'a dyn LineageGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Replaces the evaluator registry.
    pub fn with_registry(mut self, registry: Arc<EvaluatorRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Returns the catalog searches are compiled against.
    pub fn catalog(&self) -> &'a TermCatalog {
        self.catalog
    }

    /// Returns a reference to the executor configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Returns a reference to the plan cache if enabled.
    pub fn cache(&self) -> Option<&PlanCache> {
        self.cache.as_deref()
    }

    /// Returns the evaluator registry.
    pub fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    /// A paginator over the store using the configured chunk size.
    pub fn paginator(&self) -> Paginator<'a, S> {
        Paginator::new(self.store).with_chunk_size(self.config.in_chunk_size)
    }

    /// Compiles a search, using the plan cache when enabled.
    pub fn compile(
        &self,
        instance: &SearchInstance,
        order: Option<&OrderSpec>,
    ) -> SearchResult<Arc<CompiledQuery>> {
        self.compile_cached(instance, order).map(|(plan, _)| plan)
    }

    /// Runs a search and returns the pagination over its ids.
    ///
    /// Without selected traversals the plan's ids are the result. Otherwise
    /// the plan's ids seed every selected evaluator; the result is the
    /// initial ids (unless excluded) followed by the union of what the
    /// evaluators found, and each found id records the vessel it came from.
    ///
    /// A search whose only top-level term has an alternate definition runs
    /// against that catalog instead, unordered and uncached, and the alternate
    /// evaluator registered for its result entity maps the ids back. Selected
    /// traversals do not apply to it.
    ///
    /// # Errors
    ///
    /// - `Validation` if the search input is invalid; the store is not called
    /// - `Configuration` for catalog problems, oversized IN lists, unknown
    ///   evaluators (alternate ones included), or traversals without a
    ///   lineage graph
    /// - `DataAccess` if the store fails
    pub fn start_search(
        &self,
        instance: &SearchInstance,
        order: Option<&OrderSpec>,
    ) -> SearchResult<SearchOutcome> {
        let start = Instant::now();

        if let Some(alternate) = instance.alternate_definition(self.catalog)? {
            return self.start_alternate_search(instance, alternate, start);
        }

        let (query, cache_hit) = self.compile_cached(instance, order)?;
        let mut stats = SearchStats {
            compile_duration: if cache_hit { Duration::ZERO } else { start.elapsed() },
            cache_hit,
            ..SearchStats::default()
        };

        let evaluators = self.selected_evaluators(instance)?;
        let page_size = instance.page_size().unwrap_or(self.config.page_size);
        let paginator = self.paginator();

        let pagination = match (evaluators.is_empty(), self.graph) {
            (true, _) => {
                let project_start = Instant::now();
                let pagination = paginator.start_search(&query, page_size)?;
                stats.project_duration = project_start.elapsed();
                stats.initial_count = pagination.len();
                pagination
            }
            (false, None) => {
                let label = evaluators
                    .first()
                    .map(|(e, _)| e.label().to_string())
                    .unwrap_or_default();
                return Err(ConfigurationError::MissingLineageGraph(label).into());
            }
            (false, Some(graph)) => {
                let project_start = Instant::now();
                let initial = paginator.start_search(&query, page_size)?;
                stats.project_duration = project_start.elapsed();
                stats.initial_count = initial.len();

                let traversal_start = Instant::now();
                let mut related = TraversalResult::new();
                for (evaluator, direction) in &evaluators {
                    related.merge(evaluator.evaluate(graph, initial.ids(), *direction)?);
                }
                stats.traversal_duration = traversal_start.elapsed();

                let pagination =
                    combine(initial, &related, page_size, instance.exclude_initial_entities());
                stats.traversal_count = pagination.len().saturating_sub(
                    if instance.exclude_initial_entities() { 0 } else { stats.initial_count },
                );
                pagination
            }
        };

        stats.total_duration = start.elapsed();
        tracing::info!(
            entity = %pagination.entity().name,
            matched = stats.initial_count,
            related = stats.traversal_count,
            total = pagination.len(),
            cache_hit,
            elapsed_ms = stats.total_duration.as_millis() as u64,
            "search started"
        );
        Ok(SearchOutcome::new(pagination, stats))
    }

    /// Loads one page of a search.
    pub fn get_page(
        &self,
        pagination: &Pagination,
        page: usize,
    ) -> SearchResult<Vec<Option<S::Entity>>> {
        self.paginator().get_page(pagination, page)
    }

    fn start_alternate_search(
        &self,
        instance: &SearchInstance,
        alternate: &TermCatalog,
        start: Instant,
    ) -> SearchResult<SearchOutcome> {
        let evaluator = self.registry.require_alternate(&alternate.result_entity().name)?;
        let query = Compiler::from_config(alternate, &self.config).compile(instance, None)?;
        let mut stats = SearchStats {
            compile_duration: start.elapsed(),
            ..SearchStats::default()
        };
        let page_size = instance.page_size().unwrap_or(self.config.page_size);

        let project_start = Instant::now();
        let found = self.paginator().start_search(&query, page_size)?;
        stats.project_duration = project_start.elapsed();
        stats.initial_count = found.len();

        let traversal_start = Instant::now();
        let graph = self.graph.unwrap_or(&NoLineage);
        let mapped = evaluator.evaluate(graph, found.ids(), evaluator.default_direction())?;
        stats.traversal_duration = traversal_start.elapsed();
        stats.traversal_count = mapped.len();

        let pagination = Pagination::new(
            self.catalog.result_entity().clone(),
            mapped.entity_ids(),
            page_size,
            Vec::new(),
        );
        stats.total_duration = start.elapsed();
        tracing::info!(
            entity = %pagination.entity().name,
            alternate = %alternate.result_entity().name,
            matched = stats.initial_count,
            total = pagination.len(),
            elapsed_ms = stats.total_duration.as_millis() as u64,
            "alternate search started"
        );
        Ok(SearchOutcome::new(pagination, stats))
    }

    fn compile_cached(
        &self,
        instance: &SearchInstance,
        order: Option<&OrderSpec>,
    ) -> SearchResult<(Arc<CompiledQuery>, bool)> {
        let key = self
            .cache
            .as_ref()
            .and_then(|_| plan_cache_key(instance, order));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(plan) = cache.get(key) {
                tracing::debug!("compiled plan served from cache");
                return Ok((plan, true));
            }
        }

        let plan = Arc::new(Compiler::from_config(self.catalog, &self.config).compile(instance, order)?);

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.set(key, Arc::clone(&plan));
        }
        Ok((plan, false))
    }

    fn selected_evaluators(
        &self,
        instance: &SearchInstance,
    ) -> SearchResult<Vec<(Arc<dyn TraversalEvaluator>, Direction)>> {
        let mut selected = Vec::new();
        for key in instance.selected_traversals() {
            let evaluator = self.registry.require(key)?;
            let direction = evaluator.default_direction();
            selected.push((evaluator, direction));
        }
        if let Some(custom) = instance.custom_traversal() {
            let evaluator = self.registry.require_custom(&custom.option)?;
            selected.push((evaluator, custom.direction));
        }
        Ok(selected)
    }
}

impl<S: EntityStore> std::fmt::Debug for SearchExecutor<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchExecutor")
            .field("entity", &self.catalog.result_entity().name)
            .field("has_graph", &self.graph.is_some())
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Stands in for the lineage graph when an alternate evaluator runs without one.
struct NoLineage;

impl LineageGraph for NoLineage {
    fn transfers_from(&self, _id: &EntityId) -> Vec<Transfer> {
        Vec::new()
    }

    fn transfers_to(&self, _id: &EntityId) -> Vec<Transfer> {
        Vec::new()
    }

    fn vessel_kind(&self, _id: &EntityId) -> Option<VesselKind> {
        None
    }
}

/// Initial ids (unless excluded) followed by related ids, with provenance.
fn combine(
    initial: Pagination,
    related: &TraversalResult,
    page_size: usize,
    exclude_initial: bool,
) -> Pagination {
    let initial_ids: HashSet<_> = initial.ids().iter().collect();
    let mut ids = if exclude_initial {
        Vec::with_capacity(related.len())
    } else {
        initial.ids().to_vec()
    };
    ids.extend(
        related
            .entries()
            .iter()
            .filter(|entry| !(exclude_initial && initial_ids.contains(&entry.entity)))
            .map(|entry| entry.entity.clone()),
    );

    let mut pagination = Pagination::new(
        initial.entity().clone(),
        ids,
        page_size,
        initial.join_fetch().to_vec(),
    );
    for entry in related {
        if !initial_ids.contains(&entry.entity) {
            pagination.add_extra_id_info(
                entry.entity.clone(),
                format!("{} hop(s) from {}", entry.hop_count, entry.origin),
            );
        }
    }
    pagination
}
