use orgdir_core::{
    Activity, ActivityTreeResolver, Building, EntityStore, GeoBox, OrganizationRecord, Page,
    StoreResult,
};
use proptest::prelude::*;
use std::cell::Cell;
use std::collections::{BTreeSet, HashMap, VecDeque};

const MAX_NODES: usize = 16;
const MAX_EDGES: usize = 48;
const MAX_DEPTH: u32 = 6;

/// An activity graph that is allowed to contain cycles and self-loops, which
/// the real store refuses to build.
struct GraphStore {
    children: HashMap<String, Vec<String>>,
    round_trips: Cell<usize>,
}

impl GraphStore {
    fn new(edges: &[(usize, usize)]) -> Self {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for &(parent, child) in edges {
            children
                .entry(parent.to_string())
                .or_default()
                .push(child.to_string());
        }
        Self {
            children,
            round_trips: Cell::new(0),
        }
    }

    fn activity(id: &str, parent: &str) -> Activity {
        Activity {
            id: id.to_string(),
            name: format!("activity {id}"),
            parent_id: Some(parent.to_string()),
        }
    }
}

impl EntityStore for GraphStore {
    fn find_building_by_id(&self, _id: &str) -> StoreResult<Option<Building>> {
        Ok(None)
    }

    fn list_buildings(&self, _page: Page) -> StoreResult<Vec<Building>> {
        Ok(Vec::new())
    }

    fn find_buildings_in_box(&self, _bbox: &GeoBox) -> StoreResult<Vec<Building>> {
        Ok(Vec::new())
    }

    fn find_activity_by_id(&self, _id: &str) -> StoreResult<Option<Activity>> {
        Ok(None)
    }

    fn find_activities_by_parent(&self, parent_id: &str) -> StoreResult<Vec<Activity>> {
        Ok(self
            .children
            .get(parent_id)
            .map(|kids| kids.iter().map(|k| Self::activity(k, parent_id)).collect())
            .unwrap_or_default())
    }

    fn find_activities_by_parents(&self, parent_ids: &[String]) -> StoreResult<Vec<Activity>> {
        self.round_trips.set(self.round_trips.get() + 1);
        let mut out = Vec::new();
        for parent in parent_ids {
            out.extend(self.find_activities_by_parent(parent)?);
        }
        Ok(out)
    }

    fn root_activities(&self) -> StoreResult<Vec<Activity>> {
        Ok(Vec::new())
    }

    fn find_root_activity_by_name_substring(&self, _needle: &str) -> StoreResult<Option<Activity>> {
        Ok(None)
    }

    fn find_organization_by_id(&self, _id: &str) -> StoreResult<Option<OrganizationRecord>> {
        Ok(None)
    }

    fn list_organizations(&self, _page: Page) -> StoreResult<Vec<OrganizationRecord>> {
        Ok(Vec::new())
    }

    fn find_organizations_by_building_id(&self, _id: &str) -> StoreResult<Vec<OrganizationRecord>> {
        Ok(Vec::new())
    }

    fn find_organizations_by_building_ids(
        &self,
        _ids: &[String],
    ) -> StoreResult<Vec<OrganizationRecord>> {
        Ok(Vec::new())
    }

    fn find_organizations_by_activity_ids(
        &self,
        _ids: &[String],
    ) -> StoreResult<Vec<OrganizationRecord>> {
        Ok(Vec::new())
    }

    fn find_organizations_by_name_substring(
        &self,
        _needle: &str,
    ) -> StoreResult<Vec<OrganizationRecord>> {
        Ok(Vec::new())
    }
}

/// Shortest edge distance from `root` to every reachable node.
fn distances(edges: &[(usize, usize)], root: usize) -> HashMap<usize, u32> {
    let mut dist = HashMap::new();
    dist.insert(root, 0u32);
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        let d = dist[&node];
        for &(parent, child) in edges {
            if parent == node && !dist.contains_key(&child) {
                dist.insert(child, d + 1);
                queue.push_back(child);
            }
        }
    }
    dist
}

fn graph_strategy() -> impl Strategy<Value = (Vec<(usize, usize)>, usize)> {
    (1usize..=MAX_NODES).prop_flat_map(|n| {
        (
            prop::collection::vec((0..n, 0..n), 0..=MAX_EDGES),
            0..n,
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn descendants_are_exactly_the_nodes_within_depth(
        (edges, root) in graph_strategy(),
        depth in 0u32..=MAX_DEPTH,
    ) {
        let store = GraphStore::new(&edges);
        let resolver = ActivityTreeResolver::new(&store);
        let got = resolver.resolve_descendants(&root.to_string(), depth).unwrap();

        let unique: BTreeSet<String> = got.iter().cloned().collect();
        prop_assert_eq!(unique.len(), got.len(), "ids must not repeat");
        prop_assert!(!unique.contains(&root.to_string()), "root must be excluded");

        let expected: BTreeSet<String> = distances(&edges, root)
            .into_iter()
            .filter(|&(node, d)| node != root && d <= depth)
            .map(|(node, _)| node.to_string())
            .collect();
        prop_assert_eq!(unique, expected);
    }

    #[test]
    fn one_round_trip_per_level_at_most(
        (edges, root) in graph_strategy(),
        depth in 0u32..=MAX_DEPTH,
    ) {
        let store = GraphStore::new(&edges);
        ActivityTreeResolver::new(&store)
            .resolve_descendants(&root.to_string(), depth)
            .unwrap();
        prop_assert!(store.round_trips.get() <= depth as usize);
    }

    #[test]
    fn resolution_is_idempotent(
        (edges, root) in graph_strategy(),
        depth in 0u32..=MAX_DEPTH,
    ) {
        let store = GraphStore::new(&edges);
        let resolver = ActivityTreeResolver::new(&store);
        let first = resolver.resolve_descendants(&root.to_string(), depth).unwrap();
        let second = resolver.resolve_descendants(&root.to_string(), depth).unwrap();
        prop_assert_eq!(first, second);
    }
}
