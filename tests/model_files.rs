//! File-backed targets model.

mod common;

use std::fs;
use std::path::Path;

use common::{index, keys, total};
use polars::prelude::*;
use spandex_targets::{TargetsConfig, TargetsError, TargetsModel};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "households.csv",
        " building_id , persons ,income\nb1,1,100\nb1,2,200\nb2,3,300\n",
    );
    write(
        dir.path(),
        "buildings.csv",
        "container_id,units,sqft\nb1,2,2000\nb2,4,4000\nb3,1,1000\n",
    );
    write(
        dir.path(),
        "synthesis.csv",
        "target_value,geo_id_col,filters,count,capacity_col,capacity_expr,stuff\n\
         6,building_id,,,units,,\n\
         8,building_id,,,,sqft / 1000,True\n",
    );
    write(
        dir.path(),
        "scaling.csv",
        "column_name,target_value,target_metric,filters,clip_low,clip_high,int_result\n\
         income,300,mean,,,,\n\
         income,1000,sum,persons > 2,,,True\n",
    );
    dir
}

fn model(dir: &TempDir, seed: u64) -> TargetsModel {
    TargetsModel::new(dir.path(), TargetsConfig::default().with_seed(seed))
}

#[test]
fn csv_tables_get_trimmed_names_and_an_index() {
    let dir = workspace();
    let df = model(&dir, 1).load_table("households.csv").unwrap();

    assert_eq!(
        df.get_column_names_str(),
        vec!["building_id", "persons", "income", "index"]
    );
    assert_eq!(index(&df), vec![0, 1, 2]);
    assert_eq!(df.column("persons").unwrap().dtype(), &DataType::Int64);
}

#[test]
fn parquet_tables_load_by_extension() {
    let dir = workspace();
    let mut df = df!(
        "container_id" => ["b1", "b2"],
        "units" => [3i64, 5],
    )
    .unwrap();
    let mut file = fs::File::create(dir.path().join("buildings.parquet")).unwrap();
    ParquetWriter::new(&mut file).finish(&mut df).unwrap();

    let loaded = model(&dir, 1).load_table("buildings.parquet").unwrap();
    assert_eq!(loaded.height(), 2);
    assert_eq!(total(&loaded, "units"), 8.0);
    assert_eq!(index(&loaded), vec![0, 1]);
}

#[test]
fn custom_separator() {
    let dir = workspace();
    write(dir.path(), "semi.csv", "container_id;units\nb1;2\nb2;4\n");
    let config = TargetsConfig::default().with_csv_separator(b';');
    let df = TargetsModel::new(dir.path(), config)
        .load_table("semi.csv")
        .unwrap();
    assert_eq!(total(&df, "units"), 6.0);
}

#[test]
fn targets_are_read_as_text() {
    let dir = workspace();
    let targets = model(&dir, 1).load_targets("synthesis.csv", None).unwrap();
    assert_eq!(targets.height(), 2);
    for column in targets.get_columns() {
        assert_eq!(column.dtype(), &DataType::String);
    }
}

#[test]
fn targets_columns_can_be_renamed() {
    let dir = workspace();
    write(dir.path(), "renamed.csv", "goal,geo\n5,building_id\n");
    let rename = [("goal", "target_value"), ("geo", "geo_id_col")]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
    let targets = model(&dir, 1)
        .load_targets("renamed.csv", Some(&rename))
        .unwrap();
    assert_eq!(
        targets.get_column_names_str(),
        vec!["target_value", "geo_id_col"]
    );
}

#[test]
fn missing_file_is_an_error() {
    let dir = workspace();
    assert!(model(&dir, 1).load_table("nope.csv").is_err());
    assert!(matches!(
        model(&dir, 1).load_table("nope.parquet"),
        Err(TargetsError::Io(_))
    ));
}

#[test]
fn scaling_from_files() {
    let dir = workspace();
    let model = model(&dir, 1);
    let df = model.load_table("households.csv").unwrap();
    let targets = model.load_targets("scaling.csv", None).unwrap();

    let scaled = model.scale_from_table(&df, &targets).unwrap();
    let income = spandex_targets::frame::numeric_values(&scaled, "income").unwrap();
    assert_eq!(income, vec![150.0, 300.0, 1000.0]);
}

#[test]
fn synthesis_from_files() {
    let dir = workspace();
    let mut model = model(&dir, 5);
    let result = model
        .synthesize_files("households.csv", "buildings.csv", "synthesis.csv")
        .unwrap();

    assert_eq!(result.table.height(), 8);
    let placed = keys(&result.table, "building_id");
    assert_eq!(placed[3..6].to_vec(), vec![Some("b2".to_string()); 3]);
    assert_eq!(result.outcomes[0].added, 3);
    assert_eq!(result.outcomes[1].added, 2);
    assert_eq!(result.outcomes[1].allocation.stuffed, 1);
}

#[test]
fn seeded_models_reproduce_each_other() {
    let dir = workspace();
    let mut a = model(&dir, 9);
    let mut b = model(&dir, 9);
    let first = a
        .synthesize_files("households.csv", "buildings.csv", "synthesis.csv")
        .unwrap();
    let second = b
        .synthesize_files("households.csv", "buildings.csv", "synthesis.csv")
        .unwrap();
    assert!(first.table.equals_missing(&second.table));

    a.reseed(9);
    let again = a
        .synthesize_files("households.csv", "buildings.csv", "synthesis.csv")
        .unwrap();
    assert!(first.table.equals_missing(&again.table));
}
