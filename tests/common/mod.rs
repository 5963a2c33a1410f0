//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use polars::prelude::*;
use spandex_targets::frame;
use spandex_targets::schema::{container, table};

/// Four households, one not yet placed in a building.
pub fn households() -> DataFrame {
    df!(
        table::INDEX => [0i64, 1, 2, 3],
        "building_id" => [Some("b1"), Some("b1"), Some("b2"), None],
        "persons" => [1i64, 2, 3, 4],
    )
    .unwrap()
}

/// Three buildings with room for seven households in total.
pub fn buildings() -> DataFrame {
    df!(
        container::CONTAINER_ID => ["b1", "b2", "b3"],
        "units" => [2i64, 4, 1],
        "sqft" => [2000.0, 4000.0, 1000.0],
    )
    .unwrap()
}

/// A synthesis targets table as loaded from CSV: every cell is text.
pub fn synthesis_targets(rows: &[[&str; 5]]) -> DataFrame {
    let column = |i: usize| -> Vec<Option<&str>> {
        rows.iter()
            .map(|r| Some(r[i]).filter(|s| !s.is_empty()))
            .collect()
    };
    df!(
        "target_value" => column(0),
        "geo_id_col" => column(1),
        "filters" => column(2),
        "count" => column(3),
        "capacity_col" => column(4),
    )
    .unwrap()
}

pub fn index(df: &DataFrame) -> Vec<i64> {
    frame::row_index(df).unwrap()
}

pub fn total(df: &DataFrame, column: &str) -> f64 {
    frame::numeric_values(df, column).unwrap().iter().sum()
}

pub fn keys(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    frame::key_values(df, column).unwrap()
}
