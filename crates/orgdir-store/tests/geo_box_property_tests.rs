use orgdir_store::{Building, DirectoryDb, GeoBox};
use proptest::prelude::*;

const MAX_BUILDINGS: usize = 40;

fn coords_strategy() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-90.0f64..=90.0, -180.0f64..=180.0), 0..=MAX_BUILDINGS)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn box_query_matches_linear_scan(
        coords in coords_strategy(),
        lat in -90.0f64..=90.0,
        lon in -180.0f64..=180.0,
        radius in -1.0f64..=60.0,
    ) {
        let mut db = DirectoryDb::new();
        for (i, &(latitude, longitude)) in coords.iter().enumerate() {
            db.insert_building(Building {
                id: format!("b{i}"),
                address: String::new(),
                latitude,
                longitude,
            }).unwrap();
        }

        let bbox = GeoBox::around(lat, lon, radius);
        let got: Vec<String> = db
            .find_buildings_in_box(&bbox)
            .into_iter()
            .map(|b| b.id)
            .collect();
        let expected: Vec<String> = coords
            .iter()
            .enumerate()
            .filter(|(_, &(la, lo))| bbox.contains(la, lo))
            .map(|(i, _)| format!("b{i}"))
            .collect();

        prop_assert_eq!(got, expected);
    }
}
