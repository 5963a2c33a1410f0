//! Add or remove agent rows so a table meets a row-count or column-sum
//! target, allocating new rows to containers under capacity limits.
use std::collections::HashSet;

use polars::prelude::*;
use rand::Rng;
use tracing::{debug, warn};

use crate::allocation::{allocate_rows, AllocationReport, Constraint};
use crate::error::TargetsError;
use crate::frame;

/// Slack allowed when comparing running column sums against a target.
const TOLERANCE: f64 = 1e-9;

/// What an add-or-remove pass achieved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisOutcome {
    pub target: f64,
    /// Row count or column sum of the resulting table.
    pub achieved: f64,
    pub added: usize,
    pub removed: usize,
    pub allocation: AllocationReport,
}

impl SynthesisOutcome {
    /// Whether `achieved` equals `target`. The greedy by-count selection
    /// can fall short when no combination of rows fits the difference.
    pub fn is_exact(&self) -> bool {
        (self.achieved - self.target).abs() <= TOLERANCE
    }
}

/// A synthesized table together with its outcome.
#[derive(Debug, Clone)]
pub struct Synthesized {
    pub table: DataFrame,
    pub outcome: SynthesisOutcome,
}

/// Remove `num` rows chosen uniformly at random, without replacement.
pub fn remove_rows<R: Rng + ?Sized>(
    df: &DataFrame,
    num: usize,
    rng: &mut R,
) -> Result<DataFrame, TargetsError> {
    if num == 0 {
        return Ok(df.clone());
    }
    if num > df.height() {
        return Err(TargetsError::InvalidTarget(format!(
            "cannot remove {num} rows from a table of {}",
            df.height()
        )));
    }

    let index = frame::row_index(df)?;
    let removed: HashSet<i64> = rand::seq::index::sample(rng, index.len(), num)
        .into_iter()
        .map(|pos| index[pos])
        .collect();

    frame::drop_indices(df, &removed)
}

/// Copy `num` rows sampled uniformly with replacement, give them fresh
/// index values after the table's maximum, allocate them to containers and
/// append them.
pub fn add_rows<R: Rng + ?Sized>(
    df: &DataFrame,
    num: usize,
    alloc_column: &str,
    constraint: &Constraint,
    stuff: bool,
    rng: &mut R,
) -> Result<(DataFrame, AllocationReport), TargetsError> {
    if num == 0 {
        return Ok((df.clone(), AllocationReport::default()));
    }
    if df.height() == 0 {
        return Err(TargetsError::NoRowsToSynthesize);
    }

    let positions: Vec<usize> = (0..num).map(|_| rng.gen_range(0..df.height())).collect();
    append_allocated(df, &positions, alloc_column, constraint, stuff)
}

/// Remove rows so the sum of `count` drops by `amount`.
///
/// Rows are visited from the largest positive `count` value down and
/// removed whenever their value still fits in the remaining amount.
pub fn remove_rows_by_count(
    df: &DataFrame,
    amount: f64,
    count: &str,
) -> Result<DataFrame, TargetsError> {
    if amount <= TOLERANCE {
        return Ok(df.clone());
    }

    let index = frame::row_index(df)?;
    let candidates: Vec<(usize, f64)> = descending_candidates(df, count)?
        .into_iter()
        .filter(|&(_, v)| v <= amount + TOLERANCE)
        .collect();

    let mut remaining = amount;
    let mut removed = HashSet::new();
    for (pos, v) in candidates {
        if v <= remaining + TOLERANCE {
            removed.insert(index[pos]);
            remaining -= v;
        }
        if remaining.abs() <= TOLERANCE {
            break;
        }
    }

    frame::drop_indices(df, &removed)
}

/// Copy rows so the sum of `count` grows by `amount`, then allocate the
/// copies to containers.
///
/// Rows are picked greedily from the largest positive `count` value down,
/// repeating while at least one unit is missing. When nothing fits the
/// remainder the most recent pick is dropped and the search continues with
/// strictly smaller values; if there are none the pick is restored and the
/// search stops short of the target.
pub fn add_rows_by_count(
    df: &DataFrame,
    amount: f64,
    count: &str,
    alloc_column: &str,
    constraint: &Constraint,
    stuff: bool,
) -> Result<(DataFrame, AllocationReport), TargetsError> {
    if amount <= TOLERANCE {
        return Ok((df.clone(), AllocationReport::default()));
    }

    let all = descending_candidates(df, count)?;
    let mut pool = all.clone();
    let mut picked: Vec<(usize, f64)> = Vec::new();
    let mut remaining = amount;

    while remaining >= 1.0 - TOLERANCE {
        pool.retain(|&(_, v)| v <= remaining + TOLERANCE);

        if pool.is_empty() {
            let Some((pos, v)) = picked.pop() else {
                break;
            };
            remaining += v;
            pool = all
                .iter()
                .copied()
                .filter(|&(_, w)| w < v && w <= remaining + TOLERANCE)
                .collect();
            if pool.is_empty() {
                picked.push((pos, v));
                remaining -= v;
                break;
            }
        }

        for &(pos, v) in &pool {
            if v <= remaining + TOLERANCE {
                picked.push((pos, v));
                remaining -= v;
            }
            if remaining.abs() <= TOLERANCE {
                break;
            }
        }
    }

    let positions: Vec<usize> = picked.into_iter().map(|(pos, _)| pos).collect();
    append_allocated(df, &positions, alloc_column, constraint, stuff)
}

/// Add or remove rows of `df` to meet `target`.
///
/// Without `count` the number of rows is compared to `target`: missing rows
/// are sampled with replacement and allocated, surplus rows are removed at
/// random. With `count` the column sum is compared instead and rows are
/// picked greedily by value. `df` is never modified.
pub fn add_or_remove_rows<R: Rng + ?Sized>(
    df: &DataFrame,
    target: f64,
    alloc_column: &str,
    constraint: &Constraint,
    count: Option<&str>,
    stuff: bool,
    rng: &mut R,
) -> Result<Synthesized, TargetsError> {
    if !target.is_finite() {
        return Err(TargetsError::InvalidTarget(format!("{target} is not finite")));
    }
    frame::require_columns(df, &[alloc_column])?;

    let before = df.height();
    let mut allocation = AllocationReport::default();

    let (table, achieved) = match count {
        None => {
            if target < 0.0 || target.fract() != 0.0 {
                return Err(TargetsError::InvalidTarget(format!(
                    "row count target must be a whole non-negative number, got {target}"
                )));
            }
            let wanted = target as usize;
            let table = if before < wanted {
                debug!(rows = wanted - before, "adding rows based on number of rows");
                let (table, report) =
                    add_rows(df, wanted - before, alloc_column, constraint, stuff, rng)?;
                allocation = report;
                table
            } else if before > wanted {
                debug!(rows = before - wanted, "removing rows based on number of rows");
                remove_rows(df, before - wanted, rng)?
            } else {
                debug!("target number of rows is met");
                df.clone()
            };
            let achieved = table.height() as f64;
            (table, achieved)
        }
        Some(count) => {
            frame::require_columns(df, &[count])?;
            let current = column_sum(df, count)?;
            let table = if current < target - TOLERANCE {
                debug!(amount = target - current, "adding rows based on total of count column");
                let (table, report) = add_rows_by_count(
                    df,
                    target - current,
                    count,
                    alloc_column,
                    constraint,
                    stuff,
                )?;
                allocation = report;
                table
            } else if current > target + TOLERANCE {
                debug!(amount = current - target, "removing rows based on total of count column");
                remove_rows_by_count(df, current - target, count)?
            } else {
                debug!("target total is met");
                df.clone()
            };
            let achieved = column_sum(&table, count)?;
            (table, achieved)
        }
    };

    let after = table.height();
    let outcome = SynthesisOutcome {
        target,
        achieved,
        added: after.saturating_sub(before),
        removed: before.saturating_sub(after),
        allocation,
    };
    if !outcome.is_exact() {
        warn!(
            target,
            achieved,
            count = count.unwrap_or("<rows>"),
            "greedy selection could not meet the target exactly"
        );
    }

    Ok(Synthesized { table, outcome })
}

/// Positions with a positive `count` value, largest value first. Ties keep
/// table order.
fn descending_candidates(df: &DataFrame, count: &str) -> Result<Vec<(usize, f64)>, TargetsError> {
    let mut candidates: Vec<(usize, f64)> = frame::numeric_values(df, count)?
        .into_iter()
        .enumerate()
        .filter(|&(_, v)| v > 0.0)
        .collect();
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(candidates)
}

fn column_sum(df: &DataFrame, count: &str) -> Result<f64, TargetsError> {
    Ok(frame::numeric_values(df, count)?.iter().sum())
}

fn append_allocated(
    df: &DataFrame,
    positions: &[usize],
    alloc_column: &str,
    constraint: &Constraint,
    stuff: bool,
) -> Result<(DataFrame, AllocationReport), TargetsError> {
    let copies = frame::take_positions(df, positions)?;
    let mut copies = frame::with_fresh_index(&copies, frame::next_index(df)?)?;
    let report = allocate_rows(&mut copies, alloc_column, constraint, stuff)?;
    Ok((frame::append_rows(df, &copies)?, report))
}
