//! Row-index bookkeeping on top of Polars frames.
//!
//! Polars frames carry no index, so tables handled by this crate keep their
//! row identity in an Int64 column named [`table::INDEX`]. Everything that
//! subsets, appends or merges rows goes through these helpers.
use std::collections::HashSet;

use polars::prelude::*;

use crate::error::TargetsError;
use crate::schema::table;

pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), TargetsError> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(TargetsError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

/// Attach a `0..n` index column when the frame has none, otherwise make
/// sure the existing one is Int64, null-free and unique.
pub fn ensure_row_index(mut df: DataFrame) -> Result<DataFrame, TargetsError> {
    if df.column(table::INDEX).is_err() {
        let values: Vec<i64> = (0..df.height() as i64).collect();
        df.with_column(Column::new(table::INDEX.into(), values))?;
        return Ok(df);
    }
    let index = df.column(table::INDEX)?.cast(&DataType::Int64)?;
    df.with_column(index)?;

    let values = row_index(&df)?;
    let mut seen = HashSet::with_capacity(values.len());
    let duplicates = values.iter().filter(|&&i| !seen.insert(i)).count();
    if duplicates > 0 {
        return Err(TargetsError::InvalidData(format!(
            "Column '{}' has {duplicates} duplicate values",
            table::INDEX
        )));
    }
    Ok(df)
}

/// Index values in row order. Null index values are rejected.
pub fn row_index(df: &DataFrame) -> Result<Vec<i64>, TargetsError> {
    let column = df
        .column(table::INDEX)
        .map_err(|_| TargetsError::MissingColumn(table::INDEX.to_string()))?
        .cast(&DataType::Int64)?;
    let ca = column.i64()?;
    if ca.null_count() > 0 {
        return Err(TargetsError::InvalidData(format!(
            "Column '{}' has {} null values",
            table::INDEX,
            ca.null_count()
        )));
    }
    Ok(ca.into_no_null_iter().collect())
}

/// First index value for rows appended to `df`.
pub fn next_index(df: &DataFrame) -> Result<i64, TargetsError> {
    Ok(row_index(df)?.into_iter().max().map_or(0, |m| m + 1))
}

/// Rows at the given positions, repeats allowed, in the given order.
pub fn take_positions(df: &DataFrame, positions: &[usize]) -> Result<DataFrame, TargetsError> {
    let idx = IdxCa::from_vec(
        PlSmallStr::from_static("positions"),
        positions.iter().map(|&p| p as IdxSize).collect(),
    );
    Ok(df.take(&idx)?)
}

/// Replace the index with a contiguous range starting at `start`.
pub fn with_fresh_index(df: &DataFrame, start: i64) -> Result<DataFrame, TargetsError> {
    let values: Vec<i64> = (start..start + df.height() as i64).collect();
    let mut out = df.clone();
    out.with_column(Column::new(table::INDEX.into(), values))?;
    Ok(out)
}

/// Keep only rows whose index is not in `removed`.
pub fn drop_indices(df: &DataFrame, removed: &HashSet<i64>) -> Result<DataFrame, TargetsError> {
    if removed.is_empty() {
        return Ok(df.clone());
    }
    let mask: BooleanChunked = row_index(df)?
        .iter()
        .map(|i| !removed.contains(i))
        .collect();
    Ok(df.filter(&mask)?)
}

/// Append `rows` below `df`, coercing `rows` to the column order and dtypes
/// of `df`. All-null `Null` columns of `df` are widened to the dtype of the
/// incoming column instead, so appended values survive.
pub fn append_rows(df: &DataFrame, rows: &DataFrame) -> Result<DataFrame, TargetsError> {
    if rows.height() == 0 {
        return Ok(df.clone());
    }
    let mut base = df.clone();
    let mut aligned = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let other = rows
            .column(column.name().as_str())
            .map_err(|_| TargetsError::MissingColumn(column.name().to_string()))?;
        if column.dtype() == &DataType::Null && other.dtype() != &DataType::Null {
            base.with_column(column.cast(other.dtype())?)?;
            aligned.push(other.clone());
        } else {
            aligned.push(other.cast(column.dtype())?);
        }
    }
    let aligned = DataFrame::new(aligned)?;
    Ok(base.vstack(&aligned)?)
}

/// Dtype both sides of a key comparison are cast to before keys are
/// rendered as text, so `1.0` and `1` name the same container. `None`
/// when the columns are not both numeric.
pub fn common_key_dtype(left: &DataType, right: &DataType) -> Option<DataType> {
    if !(left.is_primitive_numeric() && right.is_primitive_numeric()) {
        return None;
    }
    if left.is_float() || right.is_float() {
        Some(DataType::Float64)
    } else {
        Some(DataType::Int64)
    }
}

/// Copy of `df` with `column` cast to `dtype`.
pub fn cast_column(df: &DataFrame, column: &str, dtype: &DataType) -> Result<DataFrame, TargetsError> {
    let cast = df
        .column(column)
        .map_err(|_| TargetsError::MissingColumn(column.to_string()))?
        .cast(dtype)?;
    let mut out = df.clone();
    out.with_column(cast)?;
    Ok(out)
}

/// Column values as f64, with nulls read as zero.
pub fn numeric_values(df: &DataFrame, column: &str) -> Result<Vec<f64>, TargetsError> {
    let values = df
        .column(column)
        .map_err(|_| TargetsError::MissingColumn(column.to_string()))?
        .cast(&DataType::Float64)?;
    Ok(values
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect())
}

/// Column values rendered as container keys. Nulls stay `None`.
pub fn key_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>, TargetsError> {
    let values = df
        .column(column)
        .map_err(|_| TargetsError::MissingColumn(column.to_string()))?
        .cast(&DataType::String)?;
    Ok(values
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> DataFrame {
        df!(
            table::INDEX => [10i64, 11, 12],
            "zone_id" => ["a", "b", "c"],
            "persons" => [1i64, 2, 3],
        )
        .unwrap()
    }

    #[test]
    fn attaches_missing_index() {
        let df = df!("x" => [1.0, 2.0, 3.0]).unwrap();
        let df = ensure_row_index(df).unwrap();
        assert_eq!(row_index(&df).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn keeps_existing_index() {
        let df = ensure_row_index(people()).unwrap();
        assert_eq!(row_index(&df).unwrap(), vec![10, 11, 12]);
        assert_eq!(next_index(&df).unwrap(), 13);
    }

    #[test]
    fn next_index_of_empty_table_is_zero() {
        let df = people().head(Some(0));
        assert_eq!(next_index(&df).unwrap(), 0);
    }

    #[test]
    fn take_allows_repeats() {
        let out = take_positions(&people(), &[2, 0, 2]).unwrap();
        assert_eq!(row_index(&out).unwrap(), vec![12, 10, 12]);
    }

    #[test]
    fn drop_by_index_not_position() {
        let removed: HashSet<i64> = [11].into_iter().collect();
        let out = drop_indices(&people(), &removed).unwrap();
        assert_eq!(row_index(&out).unwrap(), vec![10, 12]);
    }

    #[test]
    fn append_aligns_columns() {
        let df = people();
        let extra = df!(
            "persons" => [7.0],
            "zone_id" => ["a"],
            table::INDEX => [13i64],
        )
        .unwrap();
        let out = append_rows(&df, &extra).unwrap();
        assert_eq!(out.height(), 4);
        assert_eq!(out.column("persons").unwrap().dtype(), &DataType::Int64);
        assert_eq!(numeric_values(&out, "persons").unwrap(), vec![1.0, 2.0, 3.0, 7.0]);
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let df = df!(
            table::INDEX => [1i64, 2, 1],
            "zone_id" => ["a", "b", "c"],
        )
        .unwrap();
        let err = ensure_row_index(df).unwrap_err();
        assert!(matches!(err, TargetsError::InvalidData(_)));
    }

    #[test]
    fn append_widens_all_null_columns() {
        let df = DataFrame::new(vec![
            Column::new(table::INDEX.into(), [0i64, 1]),
            Column::full_null("zone_id".into(), 2, &DataType::Null),
        ])
        .unwrap();
        let extra = df!(
            table::INDEX => [2i64],
            "zone_id" => ["a"],
        )
        .unwrap();
        let out = append_rows(&df, &extra).unwrap();
        assert_eq!(out.column("zone_id").unwrap().dtype(), &DataType::String);
        assert_eq!(
            key_values(&out, "zone_id").unwrap(),
            vec![None, None, Some("a".to_string())]
        );
    }

    #[test]
    fn numeric_keys_share_a_dtype() {
        assert_eq!(
            common_key_dtype(&DataType::Float64, &DataType::Int64),
            Some(DataType::Float64)
        );
        assert_eq!(
            common_key_dtype(&DataType::Int32, &DataType::UInt64),
            Some(DataType::Int64)
        );
        assert_eq!(common_key_dtype(&DataType::String, &DataType::Int64), None);
        assert_eq!(common_key_dtype(&DataType::Null, &DataType::Int64), None);
    }

    #[test]
    fn missing_columns_are_reported() {
        let err = require_columns(&people(), &["zone_id", "income"]).unwrap_err();
        assert!(matches!(err, TargetsError::MissingColumn(c) if c == "income"));
    }
}
