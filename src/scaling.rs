//! Scale agent attributes so they match aggregate targets.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::TargetsError;
use crate::filter::{apply_filter, Filters};
use crate::frame;
use crate::rules::{self, ScalingRule};
use crate::schema::metric;

/// How a column is aggregated for comparison to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    #[default]
    Mean,
    Median,
    Sum,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Mean => metric::MEAN,
            Metric::Median => metric::MEDIAN,
            Metric::Sum => metric::SUM,
        }
    }

    fn evaluate(&self, values: &Float64Chunked) -> Option<f64> {
        match self {
            Metric::Mean => values.mean(),
            Metric::Median => values.median(),
            Metric::Sum => values.sum(),
        }
    }
}

impl FromStr for Metric {
    type Err = TargetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            metric::MEAN => Ok(Metric::Mean),
            metric::MEDIAN => Ok(Metric::Median),
            metric::SUM => Ok(Metric::Sum),
            other => Err(TargetsError::UnknownMetric(other.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scale a column's values so they match a target aggregate metric.
///
/// Every value is multiplied by `target / metric(col)`, then clipped to
/// `[clip_low, clip_high]`. With `int_result` the values are rounded half
/// to even and returned as Int64. Nulls stay null.
pub fn scale_col_to_target(
    col: &Series,
    target: f64,
    metric: Metric,
    clip_low: Option<f64>,
    clip_high: Option<f64>,
    int_result: bool,
) -> Result<Series, TargetsError> {
    let name = col.name().clone();
    let values = col.cast(&DataType::Float64)?;
    let values = values.f64()?;

    if values.len() == values.null_count() {
        return Err(TargetsError::EmptyColumn(name.to_string()));
    }
    let current = metric
        .evaluate(values)
        .ok_or_else(|| TargetsError::EmptyColumn(name.to_string()))?;
    if current == 0.0 {
        return Err(TargetsError::ZeroAggregate {
            column: name.to_string(),
            metric: metric.to_string(),
        });
    }

    let multiplier = target / current;
    debug!(column = %name, %metric, current, target, multiplier, "scaling column");

    let scaled = values
        .into_iter()
        .map(|v| v.map(|x| clip(x * multiplier, clip_low, clip_high)));

    let series = if int_result {
        scaled
            .map(|v| v.map(|x| x.round_ties_even() as i64))
            .collect::<Int64Chunked>()
            .with_name(name)
            .into_series()
    } else {
        scaled.collect::<Float64Chunked>().with_name(name).into_series()
    };
    Ok(series)
}

fn clip(x: f64, low: Option<f64>, high: Option<f64>) -> f64 {
    let x = match low {
        Some(l) if x < l => l,
        _ => x,
    };
    match high {
        Some(h) if x > h => h,
        _ => x,
    }
}

/// Scale `target_col` segment by segment.
///
/// `filters` pairs each entry of `targets` with the rows it applies to;
/// `None` means every segment is the whole table. Segments are scaled from
/// the input values and written back by row index, so rows outside every
/// segment keep their values. Where segments overlap the later one wins.
#[allow(clippy::too_many_arguments)]
pub fn scale_to_targets(
    df: &DataFrame,
    target_col: &str,
    targets: &[f64],
    metric: Metric,
    filters: Option<&[Filters]>,
    clip_low: Option<f64>,
    clip_high: Option<f64>,
    int_result: bool,
) -> Result<DataFrame, TargetsError> {
    if let Some(filters) = filters {
        if filters.len() != targets.len() {
            return Err(TargetsError::LengthMismatch {
                targets: targets.len(),
                filters: filters.len(),
            });
        }
    }
    frame::require_columns(df, &[target_col])?;

    let mut updates = HashMap::new();
    for (i, &target) in targets.iter().enumerate() {
        let segment_filter = filters.map(|f| f[i].clone()).unwrap_or_default();
        let segment = apply_filter(df, &segment_filter)?;
        let scaled = scale_col_to_target(
            segment.column(target_col)?.as_materialized_series(),
            target,
            metric,
            clip_low,
            clip_high,
            int_result,
        )?;
        collect_updates(&segment, &scaled, &mut updates)?;
    }

    write_back(df, target_col, &updates, int_result)
}

/// Scale columns of `df` following a targets table, one rule per row.
///
/// Rules apply in table order, each seeing the effect of the previous ones.
pub fn scale_to_targets_from_table(
    df: &DataFrame,
    targets: &DataFrame,
) -> Result<DataFrame, TargetsError> {
    let rules = rules::scaling_rules(targets)?;
    let mut out = df.clone();
    for rule in &rules {
        out = apply_scaling_rule(&out, rule)?;
    }
    Ok(out)
}

/// Apply a single scaling rule.
pub fn apply_scaling_rule(df: &DataFrame, rule: &ScalingRule) -> Result<DataFrame, TargetsError> {
    info!(
        column = %rule.column,
        target = rule.target,
        metric = %rule.metric,
        filters = ?rule.filters.query(),
        "applying scaling rule"
    );
    frame::require_columns(df, &[rule.column.as_str()])?;

    let segment = apply_filter(df, &rule.filters)?;
    let scaled = scale_col_to_target(
        segment.column(&rule.column)?.as_materialized_series(),
        rule.target,
        rule.metric,
        rule.clip_low,
        rule.clip_high,
        rule.int_result,
    )?;

    let mut updates = HashMap::new();
    collect_updates(&segment, &scaled, &mut updates)?;
    write_back(df, &rule.column, &updates, rule.int_result)
}

fn collect_updates(
    segment: &DataFrame,
    scaled: &Series,
    updates: &mut HashMap<i64, Option<f64>>,
) -> Result<(), TargetsError> {
    let index = frame::row_index(segment)?;
    let values = scaled.cast(&DataType::Float64)?;
    for (i, v) in index.into_iter().zip(values.f64()?.into_iter()) {
        updates.insert(i, v);
    }
    Ok(())
}

/// Merge scaled values into a copy of `df` by row index.
///
/// The column comes back as Int64 only when rounding was requested and the
/// column was already integral; otherwise it is Float64.
fn write_back(
    df: &DataFrame,
    column: &str,
    updates: &HashMap<i64, Option<f64>>,
    int_result: bool,
) -> Result<DataFrame, TargetsError> {
    let original = df.column(column)?;
    let keep_integer = int_result && original.dtype().is_integer();
    let current = original.cast(&DataType::Float64)?;

    let merged: Float64Chunked = frame::row_index(df)?
        .iter()
        .zip(current.f64()?.into_iter())
        .map(|(i, v)| match updates.get(i) {
            Some(&updated) => updated,
            None => v,
        })
        .collect();

    let mut merged = merged.with_name(column.into()).into_series();
    if keep_integer {
        merged = merged.cast(&DataType::Int64)?;
    }

    let mut out = df.clone();
    out.with_column(merged)?;
    Ok(out)
}
