//! # labsearch-executor
//!
//! Criteria compiler, lineage traversal and pagination for laboratory
//! entity search.
//!
//! This crate turns a [`SearchInstance`] built against a [`TermCatalog`]
//! into a backend-neutral [`CompiledQuery`], runs it through any
//! [`EntityStore`], optionally widens the result along vessel transfers with
//! [`TraversalEvaluator`]s, and pages the final id list back in order.
//!
//! ## Key Features
//!
//! - **Backend-neutral plans** - Correlated sub-queries, joins and predicates as data
//! - **Chunked IN lists** - Large lists split into OR groups below the backend limit
//! - **Pluggable sub-query policy** - Choose where nested terms open sub-queries
//! - **Plan caching** - LRU cache with TTL keyed by the serialized search
//! - **Order-preserving paging** - Pages reloaded by id in chunks and reordered
//!
//! ## Quick Start
//!
//! ```ignore
//! use labsearch_executor::{SearchExecutor, SearchConfig};
//!
//! // Assumes MyStore implements EntityStore
//! let store = MyStore::new();
//! let executor = SearchExecutor::new(&catalog, &store);
//!
//! let outcome = executor.start_search(&search, None)?;
//! println!("Found {} vessels", outcome.len());
//!
//! let page = executor.get_page(&outcome.pagination, 0)?;
//! ```
//!
//! ## With Configuration
//!
//! ```ignore
//! use labsearch_executor::{CacheConfig, SearchConfig, SearchExecutor, SubqueryPolicy};
//! use std::time::Duration;
//!
//! let config = SearchConfig::builder()
//!     .with_cache(CacheConfig {
//!         max_entries: 1_000,
//!         ttl: Duration::from_secs(300),
//!     })
//!     .with_page_size(50)
//!     .with_subquery_policy(SubqueryPolicy::FlaggedOnly)
//!     .build()?;
//!
//! let executor = SearchExecutor::with_config(&catalog, &store, config).with_graph(&graph);
//! ```
//!
//! ## Compiling Without a Backend
//!
//! ```rust
//! use labsearch::{CriteriaPath, KeyType, Operator, ResultEntity, SearchInstance, TermCatalog, TermDefinition};
//! use labsearch_executor::Compiler;
//!
//! let catalog = TermCatalog::builder(ResultEntity::new("LabVessel", "labVesselId", KeyType::Long))
//!     .term(TermDefinition::builder("Barcode").path(CriteriaPath::root("label")))
//!     .build()
//!     .unwrap();
//!
//! let mut search = SearchInstance::new();
//! let barcode = search.add_top_level_term("Barcode", &catalog).unwrap();
//! search.value_mut(barcode).set_operator(Operator::Equals);
//! search.value_mut(barcode).set_values(["0123"]);
//!
//! let plan = Compiler::new(&catalog).compile(&search, None).unwrap();
//! assert_eq!(plan.entity().name, "LabVessel");
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     labsearch-executor                        │
//! │                                                               │
//! │  SearchExecutor                                               │
//! │  ├── validate + compile SearchInstance → CompiledQuery        │
//! │  │     (Compiler, SubqueryPolicy, chunked IN, PlanCache)      │
//! │  ├── project ids / entities (via EntityStore trait)           │
//! │  ├── widen along transfers (TraversalEvaluator, LineageGraph) │
//! │  └── return SearchOutcome { Pagination, SearchStats }         │
//! │                                                               │
//! │  Paginator                                                    │
//! │  └── page ids → fetch_by_ids in chunks → restore order        │
//! │                                                               │
//! │  Dependencies:                                                │
//! │  └── labsearch - TermCatalog, SearchInstance, Value types     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod cache;
mod chunk;
mod compiler;
mod config;
mod error;
mod evaluators;
mod executor;
mod paginator;
mod policy;
mod query;
mod result;
mod traits;
mod traverser;

// Public re-exports
pub use cache::{plan_cache_key, CacheStats, PlanCache};
pub use chunk::{chunk, in_predicate, DEFAULT_IN_CHUNK_SIZE, MAX_IN_VALUES};
pub use compiler::{compile, Compiler};
pub use config::{CacheConfig, SearchConfig, SearchConfigBuilder, DEFAULT_PAGE_SIZE};
pub use error::{DataAccessError, SearchExecutorError, SearchResult};
pub use evaluators::{
    EvaluatorRegistry, EventTypeEvaluator, LineageEvaluator, TraversalEvaluator,
    VesselKindEvaluator, ANCESTORS, DESCENDANTS, VESSEL_KIND,
};
pub use executor::SearchExecutor;
pub use paginator::{Pagination, Paginator};
pub use policy::{SubqueryDecision, SubqueryPolicy};
pub use query::{
    CompareOp, CompiledQuery, Join, JoinId, JoinKind, OrderBy, Predicate, PropertyRef,
    QueryBuilder, QueryScope, ScopeId, ScopeKind,
};
pub use result::{SearchOutcome, SearchStats};
pub use traits::{EntityStore, LineageGraph, Transfer, VesselKind};
pub use traverser::{
    walk, EdgeFilter, ResultOrdering, RetainRule, TraversalEntry, TraversalResult,
    TraversalRules,
};

// Re-export commonly used types from dependencies for convenience
pub use labsearch::{
    ConfigurationError, Direction, EntityId, KeyType, OrderDirection, OrderSpec, SearchInstance,
    TermCatalog, ValidationError, Value,
};
