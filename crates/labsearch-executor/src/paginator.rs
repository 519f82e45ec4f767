//! Paged retrieval of search results.
//!
//! A search first projects only the ids of matching entities, in the order
//! of the compiled plan. Pages are then loaded by id in chunks no larger
//! than the configured chunk size, and re-ordered to match the id list since
//! backends return id lookups in arbitrary order.

use std::collections::{HashMap, HashSet};

use labsearch::{EntityId, KeyType, ResultEntity, ValidationError};

use crate::chunk::{chunk, DEFAULT_IN_CHUNK_SIZE, MAX_IN_VALUES};
use crate::error::{SearchExecutorError, SearchResult};
use crate::query::CompiledQuery;
use crate::traits::EntityStore;

/// The ordered ids of a search, split into pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    entity: ResultEntity,
    ids: Vec<EntityId>,
    page_size: usize,
    join_fetch: Vec<String>,
    extra_info: HashMap<EntityId, String>,
}

impl Pagination {
    /// Creates a pagination over `ids`; duplicate ids keep their first position.
    pub fn new(
        entity: ResultEntity,
        ids: Vec<EntityId>,
        page_size: usize,
        join_fetch: Vec<String>,
    ) -> Self {
        let mut seen = HashSet::with_capacity(ids.len());
        let ids = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        Self {
            entity,
            ids,
            page_size: page_size.max(1),
            join_fetch,
            extra_info: HashMap::new(),
        }
    }

    /// The result entity.
    pub fn entity(&self) -> &ResultEntity {
        &self.entity
    }

    /// All ids in result order.
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    /// Rows per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Association paths fetched with each page.
    pub fn join_fetch(&self) -> &[String] {
        &self.join_fetch
    }

    /// Number of ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the search found nothing.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.ids.len().div_ceil(self.page_size)
    }

    /// Ids of page `page` (zero based); empty past the end.
    pub fn page_ids(&self, page: usize) -> &[EntityId] {
        let start = page.saturating_mul(self.page_size);
        if start >= self.ids.len() {
            return &[];
        }
        let end = (start + self.page_size).min(self.ids.len());
        &self.ids[start..end]
    }

    /// Attaches display text to an id, e.g. the vessel a traversal started from.
    pub fn add_extra_id_info(&mut self, id: EntityId, info: impl Into<String>) {
        self.extra_info.insert(id, info.into());
    }

    /// Display text attached to an id.
    pub fn extra_info(&self, id: &EntityId) -> Option<&str> {
        self.extra_info.get(id).map(String::as_str)
    }

    /// Key type of the ids, or `None` for an empty pagination.
    pub fn key_type(&self) -> Option<KeyType> {
        self.ids.first().map(EntityId::key_type)
    }
}

/// Loads pages of entities from an [`EntityStore`].
///
/// # Example
///
/// ```ignore
/// let paginator = Paginator::new(&store).with_chunk_size(500);
/// let pagination = paginator.start_search(&query, 100)?;
/// for entity in paginator.get_page(&pagination, 0)?.into_iter().flatten() {
///     println!("{:?}", entity);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Paginator<'a, S: EntityStore> {
    store: &'a S,
    chunk_size: usize,
}

impl<'a, S: EntityStore> Paginator<'a, S> {
    /// Creates a paginator with the default chunk size.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            chunk_size: DEFAULT_IN_CHUNK_SIZE,
        }
    }

    /// Sets the lookup chunk size, clamped to `1..=MAX_IN_VALUES`.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_IN_VALUES);
        self
    }

    /// Lookup chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Runs the plan, keeping only ids.
    ///
    /// # Errors
    ///
    /// Propagates the store's [`DataAccessError`](crate::DataAccessError).
    pub fn start_search(&self, query: &CompiledQuery, page_size: usize) -> SearchResult<Pagination> {
        let ids = self.store.project_ids(query)?;
        Ok(Pagination::new(
            query.entity().clone(),
            ids,
            page_size,
            query.join_fetch().to_vec(),
        ))
    }

    /// Runs the plan, keeping full entities alongside the pagination.
    ///
    /// For callers that render rows straight from the projection.
    pub fn start_search_entities(
        &self,
        query: &CompiledQuery,
        page_size: usize,
    ) -> SearchResult<(Pagination, Vec<S::Entity>)> {
        let entities = self.store.project_entities(query)?;
        let ids = entities.iter().map(|e| self.store.entity_key(e)).collect();
        let pagination = Pagination::new(
            query.entity().clone(),
            ids,
            page_size,
            query.join_fetch().to_vec(),
        );
        Ok((pagination, entities))
    }

    /// Loads one page in id order; ids without a row yield `None`.
    pub fn get_page(
        &self,
        pagination: &Pagination,
        page: usize,
    ) -> SearchResult<Vec<Option<S::Entity>>> {
        self.fetch_ordered(pagination, pagination.page_ids(page))
    }

    /// Loads arbitrary ids in the given order; ids without a row yield `None`.
    pub fn get_by_ids(
        &self,
        pagination: &Pagination,
        ids: &[EntityId],
    ) -> SearchResult<Vec<Option<S::Entity>>> {
        self.fetch_ordered(pagination, ids)
    }

    /// Converts ids received as text to the key type of the pagination.
    ///
    /// An empty pagination has no key type; the ids are returned as text.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidValue`] for a non-numeric id when keys are numeric.
    pub fn convert_external_ids_to_native_type(
        &self,
        pagination: &Pagination,
        ids: &[String],
    ) -> SearchResult<Vec<EntityId>> {
        match pagination.key_type() {
            Some(KeyType::Long) => ids
                .iter()
                .map(|raw| {
                    raw.trim().parse::<i64>().map(EntityId::Long).map_err(|_| {
                        SearchExecutorError::from(ValidationError::InvalidValue {
                            term: pagination.entity().id_property.clone(),
                            value: raw.clone(),
                            expected: "a whole number".to_string(),
                        })
                    })
                })
                .collect(),
            Some(KeyType::String) | None => {
                Ok(ids.iter().map(|raw| EntityId::String(raw.clone())).collect())
            }
        }
    }

    fn fetch_ordered(
        &self,
        pagination: &Pagination,
        ids: &[EntityId],
    ) -> SearchResult<Vec<Option<S::Entity>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let entity = &pagination.entity().name;
        let mut by_key: HashMap<EntityId, S::Entity> = HashMap::with_capacity(ids.len());
        for part in chunk(ids, self.chunk_size) {
            for loaded in self.store.fetch_by_ids(entity, part, pagination.join_fetch())? {
                by_key.insert(self.store.entity_key(&loaded), loaded);
            }
        }

        let restored: Vec<Option<S::Entity>> = ids
            .iter()
            .map(|id| {
                let found = by_key.get(id).cloned();
                if found.is_none() {
                    tracing::warn!(entity = %entity, id = %id, "entity missing while restoring page order");
                }
                found
            })
            .collect();
        Ok(restored)
    }
}
