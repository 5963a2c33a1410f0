//! Targets tables: one scaling or synthesis rule per row.
//!
//! Targets tables usually come from hand-edited CSV files, so every cell is
//! read as text. Blank cells, `nan`, `null` and `None` all mean "use the
//! default".
use polars::prelude::*;

use crate::error::TargetsError;
use crate::filter::Filters;
use crate::frame;
use crate::scaling::Metric;
use crate::schema::{scaling_targets, synthesis_targets};

/// Parameters for one column-scaling operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingRule {
    pub column: String,
    pub target: f64,
    pub metric: Metric,
    pub filters: Filters,
    pub clip_low: Option<f64>,
    pub clip_high: Option<f64>,
    pub int_result: bool,
}

/// Parameters for one add-or-remove-rows operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRule {
    pub target: f64,
    /// Column of the agent table holding container keys.
    pub alloc_column: String,
    /// Column of the container table holding capacities.
    pub geo_col: Option<String>,
    /// Expression over container-table columns giving capacities.
    /// Takes precedence over `geo_col`.
    pub constraint_expr: Option<String>,
    pub filters: Filters,
    /// Column whose sum is compared to `target`; rows are counted when unset.
    pub count: Option<String>,
    pub stuff: bool,
}

impl SynthesisRule {
    pub fn new(target: f64, alloc_column: impl Into<String>) -> Self {
        Self {
            target,
            alloc_column: alloc_column.into(),
            geo_col: None,
            constraint_expr: None,
            filters: Filters::None,
            count: None,
            stuff: false,
        }
    }

    pub fn with_capacity_col(mut self, geo_col: impl Into<String>) -> Self {
        self.geo_col = Some(geo_col.into());
        self
    }

    pub fn with_capacity_expr(mut self, expr: impl Into<String>) -> Self {
        self.constraint_expr = Some(expr.into());
        self
    }

    pub fn with_filters(mut self, filters: impl Into<Filters>) -> Self {
        self.filters = filters.into();
        self
    }

    pub fn with_count(mut self, count: impl Into<String>) -> Self {
        self.count = Some(count.into());
        self
    }

    pub fn with_stuff(mut self, stuff: bool) -> Self {
        self.stuff = stuff;
        self
    }
}

/// Read every row of a scaling targets table.
///
/// Required columns: column_name, target_value, target_metric.
/// Optional columns: filters, clip_low, clip_high, int_result.
pub fn scaling_rules(targets: &DataFrame) -> Result<Vec<ScalingRule>, TargetsError> {
    frame::require_columns(targets, &scaling_targets::REQUIRED)?;

    let columns = text_cells(targets, scaling_targets::COLUMN_NAME)?;
    let values = text_cells(targets, scaling_targets::TARGET_VALUE)?;
    let metrics = text_cells(targets, scaling_targets::TARGET_METRIC)?;
    let filters = text_cells(targets, scaling_targets::FILTERS)?;
    let clip_low = text_cells(targets, scaling_targets::CLIP_LOW)?;
    let clip_high = text_cells(targets, scaling_targets::CLIP_HIGH)?;
    let int_result = text_cells(targets, scaling_targets::INT_RESULT)?;

    (0..targets.height())
        .map(|row| -> Result<ScalingRule, TargetsError> {
            let column = required(&columns[row], scaling_targets::COLUMN_NAME, row)?;
            let target = number(required(&values[row], scaling_targets::TARGET_VALUE, row)?)?;
            let metric = required(&metrics[row], scaling_targets::TARGET_METRIC, row)?.parse()?;
            Ok(ScalingRule {
                column: column.to_string(),
                target,
                metric,
                filters: Filters::from_cell(filters[row].as_deref()),
                clip_low: clip_low[row].as_deref().map(number).transpose()?,
                clip_high: clip_high[row].as_deref().map(number).transpose()?,
                int_result: int_result[row].as_deref().map(flag).transpose()?.unwrap_or(false),
            })
        })
        .collect()
}

/// Read every row of a synthesis targets table.
///
/// Required columns: target_value, geo_id_col.
/// Optional columns: filters, count, capacity_col, capacity_expr, stuff.
pub fn synthesis_rules(targets: &DataFrame) -> Result<Vec<SynthesisRule>, TargetsError> {
    frame::require_columns(targets, &synthesis_targets::REQUIRED)?;

    let values = text_cells(targets, synthesis_targets::TARGET_VALUE)?;
    let geo_ids = text_cells(targets, synthesis_targets::GEO_ID_COL)?;
    let filters = text_cells(targets, synthesis_targets::FILTERS)?;
    let counts = text_cells(targets, synthesis_targets::COUNT)?;
    let capacity_cols = text_cells(targets, synthesis_targets::CAPACITY_COL)?;
    let capacity_exprs = text_cells(targets, synthesis_targets::CAPACITY_EXPR)?;
    let stuff = text_cells(targets, synthesis_targets::STUFF)?;

    (0..targets.height())
        .map(|row| -> Result<SynthesisRule, TargetsError> {
            let target = number(required(&values[row], synthesis_targets::TARGET_VALUE, row)?)?;
            let alloc_column = required(&geo_ids[row], synthesis_targets::GEO_ID_COL, row)?;
            Ok(SynthesisRule {
                target,
                alloc_column: alloc_column.to_string(),
                geo_col: capacity_cols[row].clone(),
                constraint_expr: capacity_exprs[row].clone(),
                filters: Filters::from_cell(filters[row].as_deref()),
                count: counts[row].clone(),
                stuff: stuff[row].as_deref().map(flag).transpose()?.unwrap_or(false),
            })
        })
        .collect()
}

/// Cells of `name` as trimmed text; a missing column reads as all blank.
fn text_cells(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, TargetsError> {
    if df.column(name).is_err() {
        return Ok(vec![None; df.height()]);
    }
    Ok(frame::key_values(df, name)?
        .into_iter()
        .map(|cell| {
            cell.map(|s| s.trim().to_string())
                .filter(|s| !is_blank(s))
        })
        .collect())
}

fn is_blank(s: &str) -> bool {
    s.is_empty() || matches!(s, "nan" | "NaN" | "null" | "None")
}

fn required<'a>(cell: &'a Option<String>, name: &str, row: usize) -> Result<&'a str, TargetsError> {
    cell.as_deref().ok_or_else(|| {
        TargetsError::InvalidData(format!("Targets row {row} has no value for '{name}'"))
    })
}

fn number(cell: &str) -> Result<f64, TargetsError> {
    cell.parse::<f64>()
        .map_err(|_| TargetsError::InvalidData(format!("'{cell}' is not a number")))
}

fn flag(cell: &str) -> Result<bool, TargetsError> {
    match cell.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "1.0" => Ok(true),
        "false" | "f" | "no" | "n" | "0" | "0.0" => Ok(false),
        _ => Err(TargetsError::InvalidData(format!("'{cell}' is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_rows_fall_back_to_defaults() {
        let targets = df!(
            "column_name" => ["income", "persons"],
            "target_value" => ["100000", "3"],
            "target_metric" => ["mean", "sum"],
            "filters" => [Some("tract_id == 7,num_workers > 2"), None],
            "clip_low" => [Some("0"), Some("")],
            "int_result" => [None, Some("True")],
        )
        .unwrap();

        let rules = scaling_rules(&targets).unwrap();
        assert_eq!(
            rules[0],
            ScalingRule {
                column: "income".into(),
                target: 100000.0,
                metric: Metric::Mean,
                filters: Filters::All(vec!["tract_id == 7".into(), "num_workers > 2".into()]),
                clip_low: Some(0.0),
                clip_high: None,
                int_result: false,
            }
        );
        assert_eq!(rules[1].filters, Filters::None);
        assert_eq!(rules[1].clip_low, None);
        assert!(rules[1].int_result);
        assert_eq!(rules[1].metric, Metric::Sum);
    }

    #[test]
    fn unknown_metric_in_table_is_rejected() {
        let targets = df!(
            "column_name" => ["income"],
            "target_value" => ["1"],
            "target_metric" => ["mode"],
        )
        .unwrap();
        assert!(matches!(
            scaling_rules(&targets),
            Err(TargetsError::UnknownMetric(_))
        ));
    }

    #[test]
    fn synthesis_rows_read_numeric_cells() {
        let targets = df!(
            "target_value" => [500i64, 10000],
            "geo_id_col" => ["parcel_id", "zone_id"],
            "filters" => [None, Some("zone_id == 1")],
            "count" => [None, Some("persons")],
            "capacity_col" => [Some("residential_units"), None],
            "capacity_expr" => [None, Some("non_residential_sqft / 250")],
            "stuff" => [None, Some("True")],
        )
        .unwrap();

        let rules = synthesis_rules(&targets).unwrap();
        assert_eq!(
            rules[0],
            SynthesisRule::new(500.0, "parcel_id").with_capacity_col("residential_units")
        );
        assert_eq!(
            rules[1],
            SynthesisRule::new(10000.0, "zone_id")
                .with_capacity_expr("non_residential_sqft / 250")
                .with_filters("zone_id == 1")
                .with_count("persons")
                .with_stuff(true)
        );
    }

    #[test]
    fn missing_required_column_is_reported() {
        let targets = df!("target_value" => ["1"]).unwrap();
        assert!(matches!(
            synthesis_rules(&targets),
            Err(TargetsError::MissingColumn(c)) if c == "geo_id_col"
        ));
    }

    #[test]
    fn bad_flag_is_invalid_data() {
        let targets = df!(
            "target_value" => ["1"],
            "geo_id_col" => ["zone_id"],
            "stuff" => ["sometimes"],
        )
        .unwrap();
        assert!(matches!(
            synthesis_rules(&targets),
            Err(TargetsError::InvalidData(_))
        ));
    }
}
