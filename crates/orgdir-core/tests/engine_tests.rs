//! Organization Query Engine behaviour tests

use orgdir_core::*;
use orgdir_store::{DirectoryDb, SeedDocument};
use std::collections::BTreeSet;

const SEED: &str = include_str!("../../../data/seed.json");

fn seeded() -> DirectoryDb {
    DirectoryDb::from_seed(&SeedDocument::from_json(SEED).unwrap()).unwrap()
}

fn ids(views: &[OrganizationView]) -> BTreeSet<String> {
    views.iter().map(|v| v.id.clone()).collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Food -> Meat -> Beef -> Steak -> Wagyu, plus Food -> Dairy.
fn deep_db() -> DirectoryDb {
    let mut db = DirectoryDb::new();
    db.insert_building(Building {
        id: "b1".into(),
        address: "Blyukhera 32/1".into(),
        latitude: 55.0,
        longitude: 82.9,
    })
    .unwrap();
    for (id, name, parent) in [
        ("food", "Food", None),
        ("meat", "Meat", Some("food")),
        ("dairy", "Dairy", Some("food")),
        ("beef", "Beef", Some("meat")),
        ("steak", "Steak", Some("beef")),
        ("wagyu", "Wagyu", Some("steak")),
    ] {
        db.insert_activity(Activity {
            id: id.into(),
            name: name.into(),
            parent_id: parent.map(str::to_string),
        })
        .unwrap();
    }
    for (id, tags) in [
        ("o-meat", &["meat"][..]),
        ("o-beef", &["beef"][..]),
        ("o-steak", &["steak"][..]),
        ("o-wagyu", &["wagyu"][..]),
        ("o-both", &["meat", "dairy"][..]),
    ] {
        db.insert_organization(Organization {
            id: id.into(),
            name: id.into(),
            building_id: "b1".into(),
        })
        .unwrap();
        for tag in tags {
            db.tag_organization(id, tag).unwrap();
        }
    }
    db
}

// ============================================================================
// Seed scenarios
// ============================================================================

#[test]
fn test_radius_matches_only_nearby_building() {
    let db = seeded();
    let engine = OrganizationQueryEngine::new(&db);

    let views = engine.organizations_in_radius(55.7558, 37.6173, 0.01).unwrap();
    assert_eq!(ids(&views), set(&["1"]));
    assert!(views.iter().all(|v| v.building_id == "1"));
}

#[test]
fn test_radius_with_no_buildings_is_empty() {
    let db = seeded();
    let engine = OrganizationQueryEngine::new(&db);
    assert!(engine.organizations_in_radius(0.0, 0.0, 1.0).unwrap().is_empty());
    assert!(engine.organizations_in_radius(55.7558, 37.6173, -1.0).unwrap().is_empty());
}

#[test]
fn test_radius_rejects_non_finite_input() {
    let db = seeded();
    let engine = OrganizationQueryEngine::new(&db);
    assert!(matches!(
        engine.organizations_in_radius(f64::NAN, 37.6, 0.1),
        Err(DirectoryError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.buildings_in_radius(55.7, 37.6, f64::INFINITY),
        Err(DirectoryError::InvalidArgument(_))
    ));
}

#[test]
fn test_activity_by_id_includes_descendant_tags() {
    let db = seeded();
    let engine = OrganizationQueryEngine::new(&db);

    let views = engine.organizations_by_activity("1").unwrap();
    assert_eq!(ids(&views), set(&["1", "2"]));
}

#[test]
fn test_activity_by_name_uses_root_and_direct_children() {
    let db = seeded();
    let engine = OrganizationQueryEngine::new(&db);

    let views = engine.organizations_by_activity_name("Educ").unwrap();
    assert!(ids(&views).contains("2"));

    // Only roots are matched by name.
    assert!(engine
        .organizations_by_activity_name("Programming")
        .unwrap()
        .is_empty());
}

#[test]
fn test_organization_by_id() {
    let db = seeded();
    let engine = OrganizationQueryEngine::new(&db);

    let tech = engine.organization_by_id("1").unwrap();
    assert_eq!(tech.name, "Tech University");
    assert_eq!(tech.phone_numbers.len(), 2);
    assert_eq!(tech.activity_ids, vec!["1"]);

    assert_eq!(
        engine.organization_by_id("999"),
        Err(DirectoryError::not_found(EntityKind::Organization, "999"))
    );
}

#[test]
fn test_name_search_is_case_insensitive() {
    let db = seeded();
    let engine = OrganizationQueryEngine::new(&db);

    let views = engine.search_organizations_by_name("tech").unwrap();
    assert_eq!(ids(&views), set(&["1"]));
    assert_eq!(views[0].name, "Tech University");
}

#[test]
fn test_organizations_by_building() {
    let db = seeded();
    let engine = OrganizationQueryEngine::new(&db);
    assert_eq!(ids(&engine.organizations_by_building("2").unwrap()), set(&["2"]));
    assert!(engine.organizations_by_building("404").unwrap().is_empty());
}

#[test]
fn test_buildings() {
    let db = seeded();
    let engine = OrganizationQueryEngine::new(&db);
    assert_eq!(engine.building_by_id("2").unwrap().address, "Lenina 10");
    assert!(matches!(
        engine.building_by_id("3"),
        Err(DirectoryError::NotFound { entity: EntityKind::Building, .. })
    ));
    assert_eq!(engine.list_buildings(Page::new(0, 1)).unwrap().len(), 1);
    assert_eq!(engine.list_organizations(Page::default()).unwrap().len(), 2);
}

// ============================================================================
// Depth and deduplication
// ============================================================================

#[test]
fn test_activity_depth_is_bounded_at_three() {
    let db = deep_db();
    let engine = OrganizationQueryEngine::new(&db);

    // wagyu is four levels below food.
    let views = engine.organizations_by_activity("food").unwrap();
    assert_eq!(ids(&views), set(&["o-meat", "o-beef", "o-steak", "o-both"]));
}

#[test]
fn test_activity_name_stops_at_direct_children() {
    let db = deep_db();
    let engine = OrganizationQueryEngine::new(&db);

    let views = engine.organizations_by_activity_name("FOO").unwrap();
    assert_eq!(ids(&views), set(&["o-meat", "o-both"]));
}

#[test]
fn test_depths_follow_config() {
    let db = deep_db();
    let engine = OrganizationQueryEngine::with_config(
        &db,
        QueryConfig {
            activity_depth: 4,
            name_activity_depth: 2,
        },
    );

    assert!(ids(&engine.organizations_by_activity("food").unwrap()).contains("o-wagyu"));
    assert_eq!(
        ids(&engine.organizations_by_activity_name("food").unwrap()),
        set(&["o-meat", "o-beef", "o-both"])
    );
}

#[test]
fn test_multi_tagged_organization_appears_once() {
    let db = deep_db();
    let engine = OrganizationQueryEngine::new(&db);

    for views in [
        engine.organizations_by_activity("food").unwrap(),
        engine.organizations_by_activity_name("food").unwrap(),
    ] {
        let both = views.iter().filter(|v| v.id == "o-both").count();
        assert_eq!(both, 1);
    }
}

#[test]
fn test_queries_are_idempotent() {
    let db = deep_db();
    let engine = OrganizationQueryEngine::new(&db);

    assert_eq!(
        engine.organizations_by_activity("meat").unwrap(),
        engine.organizations_by_activity("meat").unwrap()
    );
    assert_eq!(
        engine.organizations_in_radius(55.0, 82.9, 0.5).unwrap(),
        engine.organizations_in_radius(55.0, 82.9, 0.5).unwrap()
    );
}

#[test]
fn test_activity_tree_default_depth() {
    let db = deep_db();
    let engine = OrganizationQueryEngine::new(&db);

    let tree = engine.activity_tree("food", None).unwrap();
    let meat = tree.children.iter().find(|n| n.id == "meat").unwrap();
    let beef = &meat.children[0];
    let steak = &beef.children[0];
    assert_eq!(steak.level, 3);
    assert!(steak.children.is_empty());

    assert_eq!(engine.activity_forest(Some(0)).unwrap().len(), 1);
}

// ============================================================================
// Store failures
// ============================================================================

struct DownStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::new("connection refused"))
}

impl EntityStore for DownStore {
    fn find_building_by_id(&self, _id: &str) -> StoreResult<Option<Building>> {
        down()
    }
    fn list_buildings(&self, _page: Page) -> StoreResult<Vec<Building>> {
        down()
    }
    fn find_buildings_in_box(&self, _bbox: &GeoBox) -> StoreResult<Vec<Building>> {
        down()
    }
    fn find_activity_by_id(&self, _id: &str) -> StoreResult<Option<Activity>> {
        down()
    }
    fn find_activities_by_parent(&self, _parent_id: &str) -> StoreResult<Vec<Activity>> {
        down()
    }
    fn root_activities(&self) -> StoreResult<Vec<Activity>> {
        down()
    }
    fn find_root_activity_by_name_substring(&self, _needle: &str) -> StoreResult<Option<Activity>> {
        down()
    }
    fn find_organization_by_id(&self, _id: &str) -> StoreResult<Option<OrganizationRecord>> {
        down()
    }
    fn list_organizations(&self, _page: Page) -> StoreResult<Vec<OrganizationRecord>> {
        down()
    }
    fn find_organizations_by_building_id(&self, _id: &str) -> StoreResult<Vec<OrganizationRecord>> {
        down()
    }
    fn find_organizations_by_building_ids(
        &self,
        _ids: &[String],
    ) -> StoreResult<Vec<OrganizationRecord>> {
        down()
    }
    fn find_organizations_by_activity_ids(
        &self,
        _ids: &[String],
    ) -> StoreResult<Vec<OrganizationRecord>> {
        down()
    }
    fn find_organizations_by_name_substring(
        &self,
        _needle: &str,
    ) -> StoreResult<Vec<OrganizationRecord>> {
        down()
    }
}

#[test]
fn test_store_failures_surface_as_unavailable() {
    let engine = OrganizationQueryEngine::new(&DownStore);
    let unavailable = DirectoryError::StoreUnavailable("connection refused".into());

    assert_eq!(engine.organization_by_id("1"), Err(unavailable.clone()));
    assert_eq!(engine.organizations_by_activity("1"), Err(unavailable.clone()));
    assert_eq!(engine.organizations_by_activity_name("x"), Err(unavailable.clone()));
    assert_eq!(engine.organizations_in_radius(1.0, 1.0, 1.0), Err(unavailable.clone()));
    assert_eq!(engine.search_organizations_by_name("x"), Err(unavailable));
}
