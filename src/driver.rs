//! Synthesis against container capacities.
//!
//! [`synthesize_one`] works out how much room each container has left,
//! runs [`add_or_remove_rows`] on the filtered subset of the agent table and
//! folds the result back into the full table. [`synthesize_from_table`]
//! does that once per row of a targets table.
use std::collections::{HashMap, HashSet};

use polars::prelude::*;
use rand::Rng;
use tracing::{debug, info};

use crate::allocation::Constraint;
use crate::error::TargetsError;
use crate::expr;
use crate::filter::apply_filter;
use crate::frame;
use crate::rules::{self, SynthesisRule};
use crate::schema::container;
use crate::synthesis::{add_or_remove_rows, SynthesisOutcome, Synthesized};

/// Result of applying every rule of a synthesis targets table.
#[derive(Debug, Clone)]
pub struct TableSynthesis {
    pub table: DataFrame,
    /// One entry per targets row, in table order.
    pub outcomes: Vec<SynthesisOutcome>,
}

/// Add or remove rows of `df` to meet one synthesis rule.
///
/// Containers are the rows of `geo_df`, keyed by its `container_id` column.
/// Their remaining capacity is the capacity given by the rule minus the
/// number of rows of `df` already assigned to them. Rows of `df` assigned to
/// a key that `geo_df` does not have are an error.
///
/// Only rows matching the rule's filters are copied or removed. Copies get
/// index values after the largest index of the whole table.
pub fn synthesize_one<R: Rng + ?Sized>(
    df: &DataFrame,
    geo_df: &DataFrame,
    rule: &SynthesisRule,
    rng: &mut R,
) -> Result<Synthesized, TargetsError> {
    let df = frame::ensure_row_index(df.clone())?;
    frame::require_columns(&df, &[rule.alloc_column.as_str()])?;
    frame::require_columns(geo_df, &[container::CONTAINER_ID])?;

    // Numeric keys of different dtypes are compared, and allocated, in a
    // shared dtype; appended rows are cast back to the table's own.
    let (keyed, geo_keyed) = match frame::common_key_dtype(
        df.column(&rule.alloc_column)?.dtype(),
        geo_df.column(container::CONTAINER_ID)?.dtype(),
    ) {
        Some(dtype) => (
            frame::cast_column(&df, &rule.alloc_column, &dtype)?,
            frame::cast_column(geo_df, container::CONTAINER_ID, &dtype)?,
        ),
        None => (df.clone(), geo_df.clone()),
    };
    let constraint = remaining_capacity(&keyed, &geo_keyed, rule)?;

    let subset = apply_filter(&keyed, &rule.filters)?;
    if subset.height() == 0 && rule.target != 0.0 {
        return Err(TargetsError::NoRowsToSynthesize);
    }

    let synthesized = add_or_remove_rows(
        &subset,
        rule.target,
        &rule.alloc_column,
        &constraint,
        rule.count.as_deref(),
        rule.stuff,
        rng,
    )?;
    let outcome = synthesized.outcome;

    let table = if outcome.added > 0 {
        let new_rows = synthesized
            .table
            .slice(subset.height() as i64, outcome.added);
        let new_rows = frame::with_fresh_index(&new_rows, frame::next_index(&df)?)?;
        frame::append_rows(&df, &new_rows)?
    } else if outcome.removed > 0 {
        let kept: HashSet<i64> = frame::row_index(&synthesized.table)?.into_iter().collect();
        let removed: HashSet<i64> = frame::row_index(&subset)?
            .into_iter()
            .filter(|i| !kept.contains(i))
            .collect();
        frame::drop_indices(&df, &removed)?
    } else {
        df
    };

    Ok(Synthesized { table, outcome })
}

/// Apply every row of a synthesis targets table in order.
///
/// Each rule sees the table produced by the rules before it. The first
/// failing rule aborts the whole run.
pub fn synthesize_from_table<R: Rng + ?Sized>(
    df: &DataFrame,
    geo_df: &DataFrame,
    targets: &DataFrame,
    rng: &mut R,
) -> Result<TableSynthesis, TargetsError> {
    let rules = rules::synthesis_rules(targets)?;

    let mut table = df.clone();
    let mut outcomes = Vec::with_capacity(rules.len());
    for (row, rule) in rules.iter().enumerate() {
        info!(
            row,
            target = rule.target,
            alloc_column = %rule.alloc_column,
            count = ?rule.count,
            filters = ?rule.filters.query(),
            "applying synthesis rule"
        );
        let synthesized = synthesize_one(&table, geo_df, rule, rng)?;
        table = synthesized.table;
        outcomes.push(synthesized.outcome);
    }

    Ok(TableSynthesis { table, outcomes })
}

/// Capacity minus occupancy per container, in `geo_df` row order.
fn remaining_capacity(
    df: &DataFrame,
    geo_df: &DataFrame,
    rule: &SynthesisRule,
) -> Result<Constraint, TargetsError> {
    let mut occupancy: HashMap<String, f64> = HashMap::new();
    for key in frame::key_values(df, &rule.alloc_column)?.into_iter().flatten() {
        *occupancy.entry(key).or_default() += 1.0;
    }

    let keys = frame::key_values(geo_df, container::CONTAINER_ID)?;
    let known: HashSet<&str> = keys.iter().flatten().map(String::as_str).collect();
    let mut unknown: Vec<String> = occupancy
        .keys()
        .filter(|k| !known.contains(k.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        unknown.sort();
        return Err(TargetsError::UnassignedContainer(unknown));
    }

    let capacity = container_capacity(geo_df, rule)?;
    let constraint: Constraint = keys
        .into_iter()
        .zip(capacity)
        .filter_map(|(key, size)| {
            let key = key?;
            let used = occupancy.get(&key).copied().unwrap_or(0.0);
            Some((key, size - used))
        })
        .collect();

    debug!(containers = constraint.len(), "computed remaining capacity");
    Ok(constraint)
}

/// Total capacity per `geo_df` row, from the rule's expression when it has
/// one and from its capacity column otherwise. Null capacity counts as zero.
fn container_capacity(geo_df: &DataFrame, rule: &SynthesisRule) -> Result<Vec<f64>, TargetsError> {
    const CAPACITY: &str = "__capacity";

    if let Some(source) = rule.constraint_expr.as_deref() {
        let invalid = |reason: String| TargetsError::InvalidExpression {
            expr: source.to_string(),
            reason,
        };
        let capacity = expr::compile(source, geo_df.schema()).map_err(invalid)?;
        let evaluated = geo_df
            .clone()
            .lazy()
            .select([capacity.cast(DataType::Float64).alias(CAPACITY)])
            .collect()
            .map_err(|e| invalid(e.to_string()))?;
        let mut values = frame::numeric_values(&evaluated, CAPACITY)?;
        if values.len() == 1 && geo_df.height() != 1 {
            values = vec![values[0]; geo_df.height()];
        }
        return Ok(values);
    }

    match rule.geo_col.as_deref() {
        Some(column) => frame::numeric_values(geo_df, column),
        None => Err(TargetsError::MissingCapacity),
    }
}
