use seer_pas_sdk::platemap::{
    validate_plate_map, Column, PlateMap, Product,
};
use seer_pas_sdk::Table;

fn example_map() -> PlateMap {
    let mut map = PlateMap::new(vec![
        "run_a.raw".to_string(),
        "run_b.raw".to_string(),
    ])
    .expect("non-empty file list");
    map.set(
        Column::SampleName,
        vec!["patient 1", "patient 2"],
    )
    .unwrap();
    map.set(Column::WellLocation, vec!["A1", "A2"]).unwrap();
    map.set(Column::Control, vec!["C1"]).unwrap();
    map
}

#[test]
fn plate_map_round_trips_through_csv() {
    let map = example_map();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plateMap_test.csv");
    map.write_csv(&path).unwrap();

    let table = Table::from_csv_path(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(
        table.column("MS file name").unwrap(),
        vec!["run_a.raw", "run_b.raw"]
    );
    assert_eq!(table.get(0, "Sample name"), Some("patient 1"));
    // Short columns are padded with empty cells.
    assert_eq!(table.get(0, "Control"), Some("C1"));
    assert_eq!(table.get(1, "Control"), Some(""));
}

#[test]
fn rendered_map_validates_against_its_files() {
    let table = example_map().to_table().unwrap();
    let files = vec!["run_a.raw".to_string(), "run_b.raw".to_string()];
    assert!(validate_plate_map(&table, &files).is_ok());

    let missing = vec!["run_a.raw".to_string()];
    assert!(validate_plate_map(&table, &missing).is_err());

    let wrong = vec!["run_a.raw".to_string(), "other.raw".to_string()];
    assert!(validate_plate_map(&table, &wrong).is_err());
}

#[test]
fn xtr_maps_use_the_xtr_header_dialect() {
    let mut map = PlateMap::new(vec!["run_a.raw".to_string()])
        .unwrap()
        .with_product(Product::Xtr);
    map.set(Column::Nanoparticle, vec!["NP-SET-1"]).unwrap();

    let table = map.to_table().unwrap();
    assert!(table
        .headers()
        .contains(&"Nanoparticle set".to_string()));
    // The control column only exists on the XT dialect.
    assert!(!table.headers().contains(&"Control".to_string()));
}

#[test]
fn columns_longer_than_the_plate_are_rejected() {
    let mut map = PlateMap::new(vec!["run_a.raw".to_string()]).unwrap();
    let result = map.set(Column::WellLocation, vec!["A1", "A2"]);
    assert!(result.is_err());
}
