//! Property tests for chunking, pagination and traversal.

use labsearch::{Direction, EntityId, KeyType, ResultEntity, Value};
use labsearch_executor::{
    in_predicate, walk, CompiledQuery, DataAccessError, EntityStore, LineageGraph, Pagination,
    Paginator, Predicate, PropertyRef, QueryBuilder, Transfer, TraversalRules, VesselKind,
};
use proptest::prelude::*;
use std::collections::HashSet;

/// Store that answers id lookups in ascending key order.
struct SortedStore {
    rows: Vec<i64>,
}

impl EntityStore for SortedStore {
    type Entity = i64;

    fn project_ids(&self, _query: &CompiledQuery) -> Result<Vec<EntityId>, DataAccessError> {
        Ok(self.rows.iter().copied().map(EntityId::Long).collect())
    }

    fn project_entities(&self, _query: &CompiledQuery) -> Result<Vec<i64>, DataAccessError> {
        Ok(self.rows.clone())
    }

    fn fetch_by_ids(
        &self,
        _entity: &str,
        ids: &[EntityId],
        _join_fetch: &[String],
    ) -> Result<Vec<i64>, DataAccessError> {
        let mut found: Vec<i64> = ids
            .iter()
            .filter_map(|id| match id {
                EntityId::Long(n) => Some(*n),
                EntityId::String(_) => None,
            })
            .collect();
        found.sort_unstable();
        Ok(found)
    }

    fn entity_key(&self, entity: &i64) -> EntityId {
        EntityId::Long(*entity)
    }
}

/// Graph over a plain edge list.
struct Edges(Vec<Transfer>);

impl LineageGraph for Edges {
    fn transfers_from(&self, id: &EntityId) -> Vec<Transfer> {
        self.0.iter().filter(|t| &t.source == id).cloned().collect()
    }

    fn transfers_to(&self, id: &EntityId) -> Vec<Transfer> {
        self.0.iter().filter(|t| &t.target == id).cloned().collect()
    }

    fn vessel_kind(&self, _id: &EntityId) -> Option<VesselKind> {
        None
    }
}

fn query() -> CompiledQuery {
    QueryBuilder::new(ResultEntity::new("LabVessel", "labVesselId", KeyType::Long)).build()
}

fn permutation() -> impl Strategy<Value = Vec<i64>> {
    (1usize..300).prop_flat_map(|n| Just((0..n as i64).collect::<Vec<_>>()).prop_shuffle())
}

fn edge_list() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..20, 0i64..20), 0..60)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn chunked_membership_keeps_every_value(n in 1usize..3_000, size in 1usize..1_500) {
        let values: Vec<Value> = (0..n as i64).map(Value::Long).collect();
        let predicate = in_predicate(&PropertyRef::root("id"), &values, size, false, false).unwrap();

        prop_assert_eq!(predicate.literal_count(), n);
        match &predicate {
            Predicate::Or(parts) => {
                prop_assert_eq!(parts.len(), n.div_ceil(size));
                for part in parts {
                    prop_assert!(part.literal_count() <= size);
                }
            }
            Predicate::In { values, .. } => prop_assert!(values.len() <= size),
            other => prop_assert!(false, "unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn paging_restores_any_order(
        order in permutation(),
        page_size in 1usize..50,
        chunk_size in 1usize..40,
    ) {
        let store = SortedStore { rows: order.clone() };
        let paginator = Paginator::new(&store).with_chunk_size(chunk_size);
        let pagination = paginator.start_search(&query(), page_size).unwrap();

        let mut loaded = Vec::with_capacity(order.len());
        for page in 0..pagination.page_count() {
            loaded.extend(paginator.get_page(&pagination, page).unwrap().into_iter().flatten());
        }
        prop_assert_eq!(loaded, order);
    }

    #[test]
    fn pagination_keeps_first_occurrence(raw in prop::collection::vec(0i64..50, 0..200)) {
        let ids: Vec<EntityId> = raw.iter().copied().map(EntityId::Long).collect();
        let pagination = Pagination::new(query().entity().clone(), ids, 10, Vec::new());

        let mut seen = HashSet::new();
        let expected: Vec<EntityId> = raw
            .into_iter()
            .filter(|n| seen.insert(*n))
            .map(EntityId::Long)
            .collect();
        prop_assert_eq!(pagination.ids(), &expected[..]);
    }

    #[test]
    fn walk_visits_each_vessel_once(edges in edge_list(), start in 0i64..20) {
        let graph = Edges(
            edges
                .iter()
                .map(|&(source, target)| Transfer::new(source, target, "Transfer"))
                .collect(),
        );
        let start = EntityId::Long(start);
        let result = walk(&graph, std::slice::from_ref(&start), Direction::Descendants, &TraversalRules::new());

        prop_assert!(!result.contains(&start));
        let unique: HashSet<_> = result.entity_ids().into_iter().collect();
        prop_assert_eq!(unique.len(), result.len());

        let mut last_hop = 0;
        for entry in result.entries() {
            prop_assert!(entry.hop_count >= 1);
            prop_assert!(entry.hop_count >= last_hop);
            last_hop = entry.hop_count;
        }
    }
}
