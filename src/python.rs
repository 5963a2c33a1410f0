//! Python bindings for the `_core` extension module.
//!
//! Python frames rarely carry an `index` column, so every entry point that
//! tracks rows attaches one first. Sampling functions take an optional
//! `seed`; without one they draw from OS entropy.
use std::collections::HashMap;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use pyo3_polars::{PyDataFrame, PySeries};

use crate::allocation::{self, Constraint};
use crate::config::TargetsConfig;
use crate::driver;
use crate::filter::{self, Filters};
use crate::frame;
use crate::model::TargetsModel;
use crate::rng::TargetsRng;
use crate::rules::SynthesisRule;
use crate::scaling::{self, Metric};
use crate::synthesis::{self, SynthesisOutcome};

/// Read-only view of a [`SynthesisOutcome`].
#[pyclass(name = "SynthesisOutcome", frozen)]
#[derive(Clone)]
pub struct PySynthesisOutcome {
    #[pyo3(get)]
    target: f64,
    #[pyo3(get)]
    achieved: f64,
    #[pyo3(get)]
    added: usize,
    #[pyo3(get)]
    removed: usize,
    #[pyo3(get)]
    placed: usize,
    #[pyo3(get)]
    stuffed: usize,
    #[pyo3(get)]
    unplaced: usize,
}

#[pymethods]
impl PySynthesisOutcome {
    #[getter]
    fn is_exact(&self) -> bool {
        self.outcome().is_exact()
    }

    fn __repr__(&self) -> String {
        format!(
            "SynthesisOutcome(target={}, achieved={}, added={}, removed={})",
            self.target, self.achieved, self.added, self.removed
        )
    }
}

impl PySynthesisOutcome {
    fn outcome(&self) -> SynthesisOutcome {
        SynthesisOutcome {
            target: self.target,
            achieved: self.achieved,
            added: self.added,
            removed: self.removed,
            allocation: allocation::AllocationReport {
                placed: self.placed,
                stuffed: self.stuffed,
                unplaced: self.unplaced,
            },
        }
    }
}

impl From<SynthesisOutcome> for PySynthesisOutcome {
    fn from(o: SynthesisOutcome) -> Self {
        Self {
            target: o.target,
            achieved: o.achieved,
            added: o.added,
            removed: o.removed,
            placed: o.allocation.placed,
            stuffed: o.allocation.stuffed,
            unplaced: o.allocation.unplaced,
        }
    }
}

// ── Argument conversion ─────────────────────────────────────────────────────

/// `None`, a single query string, or a list of query strings.
fn extract_filters(obj: Option<&Bound<'_, PyAny>>) -> PyResult<Filters> {
    match obj {
        None => Ok(Filters::None),
        Some(o) if o.is_none() => Ok(Filters::None),
        Some(o) => match o.extract::<String>() {
            Ok(query) => Ok(Filters::One(query)),
            Err(_) => Ok(Filters::All(o.extract::<Vec<String>>()?)),
        },
    }
}

/// Dict of container key to remaining capacity, in insertion order.
/// Keys are stringified.
fn extract_constraint(dict: &Bound<'_, PyDict>) -> PyResult<Constraint> {
    let mut constraint = Constraint::with_capacity(dict.len());
    for (key, value) in dict.iter() {
        constraint.insert(key.str()?.to_string(), value.extract::<f64>()?);
    }
    Ok(constraint)
}

fn parse_metric(metric: &str) -> PyResult<Metric> {
    Ok(metric.parse::<Metric>()?)
}

fn with_outcomes(result: driver::TableSynthesis) -> (PyDataFrame, Vec<PySynthesisOutcome>) {
    let outcomes = result.outcomes.into_iter().map(Into::into).collect();
    (PyDataFrame(result.table), outcomes)
}

// ── Functions ───────────────────────────────────────────────────────────────

/// Rows of `df` matching every filter expression.
#[pyfunction]
#[pyo3(name = "apply_filter", signature = (df, filters=None))]
fn py_apply_filter(df: PyDataFrame, filters: Option<Bound<'_, PyAny>>) -> PyResult<PyDataFrame> {
    let filters = extract_filters(filters.as_ref())?;
    Ok(PyDataFrame(filter::apply_filter(&df.0, &filters)?))
}

#[pyfunction]
#[pyo3(
    name = "scale_col_to_target",
    signature = (col, target, metric="mean", clip_low=None, clip_high=None, int_result=false)
)]
fn py_scale_col_to_target(
    col: PySeries,
    target: f64,
    metric: &str,
    clip_low: Option<f64>,
    clip_high: Option<f64>,
    int_result: bool,
) -> PyResult<PySeries> {
    let scaled = scaling::scale_col_to_target(
        &col.0,
        target,
        parse_metric(metric)?,
        clip_low,
        clip_high,
        int_result,
    )?;
    Ok(PySeries(scaled))
}

#[allow(clippy::too_many_arguments)]
#[pyfunction]
#[pyo3(
    name = "scale_to_targets",
    signature = (df, target_col, targets, metric="mean", filters=None, clip_low=None, clip_high=None, int_result=false)
)]
fn py_scale_to_targets(
    df: PyDataFrame,
    target_col: &str,
    targets: Vec<f64>,
    metric: &str,
    filters: Option<Vec<Bound<'_, PyAny>>>,
    clip_low: Option<f64>,
    clip_high: Option<f64>,
    int_result: bool,
) -> PyResult<PyDataFrame> {
    let filters = filters
        .map(|items| {
            items
                .iter()
                .map(|item| extract_filters(Some(item)))
                .collect::<PyResult<Vec<_>>>()
        })
        .transpose()?;
    let df = frame::ensure_row_index(df.0)?;
    let out = scaling::scale_to_targets(
        &df,
        target_col,
        &targets,
        parse_metric(metric)?,
        filters.as_deref(),
        clip_low,
        clip_high,
        int_result,
    )?;
    Ok(PyDataFrame(out))
}

#[pyfunction]
#[pyo3(name = "scale_to_targets_from_table")]
fn py_scale_to_targets_from_table(df: PyDataFrame, targets: PyDataFrame) -> PyResult<PyDataFrame> {
    let df = frame::ensure_row_index(df.0)?;
    Ok(PyDataFrame(scaling::scale_to_targets_from_table(&df, &targets.0)?))
}

/// Returns a copy of `rows_to_add` with `alloc_column` filled in.
#[pyfunction]
#[pyo3(name = "allocate_rows", signature = (rows_to_add, alloc_column, constraint, stuff=false))]
fn py_allocate_rows(
    rows_to_add: PyDataFrame,
    alloc_column: &str,
    constraint: Bound<'_, PyDict>,
    stuff: bool,
) -> PyResult<PyDataFrame> {
    let constraint = extract_constraint(&constraint)?;
    let mut rows = rows_to_add.0;
    allocation::allocate_rows(&mut rows, alloc_column, &constraint, stuff)?;
    Ok(PyDataFrame(rows))
}

#[allow(clippy::too_many_arguments)]
#[pyfunction]
#[pyo3(
    name = "add_or_remove_rows",
    signature = (df, target, alloc_column, constraint, count=None, stuff=false, seed=None)
)]
fn py_add_or_remove_rows(
    df: PyDataFrame,
    target: f64,
    alloc_column: &str,
    constraint: Bound<'_, PyDict>,
    count: Option<&str>,
    stuff: bool,
    seed: Option<u64>,
) -> PyResult<(PyDataFrame, PySynthesisOutcome)> {
    let constraint = extract_constraint(&constraint)?;
    let df = frame::ensure_row_index(df.0)?;
    let mut rng = TargetsRng::from_optional_seed(seed);
    let result = synthesis::add_or_remove_rows(
        &df,
        target,
        alloc_column,
        &constraint,
        count,
        stuff,
        &mut rng,
    )?;
    Ok((PyDataFrame(result.table), result.outcome.into()))
}

#[allow(clippy::too_many_arguments)]
#[pyfunction]
#[pyo3(
    name = "synthesize_one",
    signature = (df, target, alloc_column, geo_df, geo_col=None, constraint_expr=None, filters=None, count=None, stuff=false, seed=None)
)]
fn py_synthesize_one(
    df: PyDataFrame,
    target: f64,
    alloc_column: &str,
    geo_df: PyDataFrame,
    geo_col: Option<String>,
    constraint_expr: Option<String>,
    filters: Option<Bound<'_, PyAny>>,
    count: Option<String>,
    stuff: bool,
    seed: Option<u64>,
) -> PyResult<(PyDataFrame, PySynthesisOutcome)> {
    let rule = SynthesisRule {
        target,
        alloc_column: alloc_column.to_string(),
        geo_col,
        constraint_expr,
        filters: extract_filters(filters.as_ref())?,
        count,
        stuff,
    };
    let mut rng = TargetsRng::from_optional_seed(seed);
    let result = driver::synthesize_one(&df.0, &geo_df.0, &rule, &mut rng)?;
    Ok((PyDataFrame(result.table), result.outcome.into()))
}

#[pyfunction]
#[pyo3(name = "synthesize_from_table", signature = (df, geo_df, targets, seed=None))]
fn py_synthesize_from_table(
    df: PyDataFrame,
    geo_df: PyDataFrame,
    targets: PyDataFrame,
    seed: Option<u64>,
) -> PyResult<(PyDataFrame, Vec<PySynthesisOutcome>)> {
    let mut rng = TargetsRng::from_optional_seed(seed);
    let result = driver::synthesize_from_table(&df.0, &geo_df.0, &targets.0, &mut rng)?;
    Ok(with_outcomes(result))
}

// ── Model ───────────────────────────────────────────────────────────────────

#[pyclass(name = "TargetsModel")]
pub struct PyTargetsModel {
    inner: TargetsModel,
}

#[pymethods]
impl PyTargetsModel {
    #[new]
    #[pyo3(signature = (base_path, seed=None, csv_separator=","))]
    fn new(base_path: String, seed: Option<u64>, csv_separator: &str) -> PyResult<Self> {
        let separator = match csv_separator.as_bytes() {
            [b] => *b,
            _ => {
                return Err(PyValueError::new_err(format!(
                    "csv_separator must be a single byte, got {csv_separator:?}"
                )))
            }
        };
        let mut config = TargetsConfig::default().with_csv_separator(separator);
        config.seed = seed;
        Ok(Self {
            inner: TargetsModel::new(base_path, config),
        })
    }

    #[getter]
    fn base_path(&self) -> String {
        self.inner.base_path().display().to_string()
    }

    #[getter]
    fn seed(&self) -> Option<u64> {
        self.inner.config().seed
    }

    fn reseed(&mut self, seed: u64) {
        self.inner.reseed(seed);
    }

    /// Load an agent or container table from CSV or Parquet.
    fn load_table(&self, filename: &str) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.inner.load_table(filename)?))
    }

    /// Load a targets table with every column as strings.
    #[pyo3(signature = (filename, rename=None))]
    fn load_targets(
        &self,
        filename: &str,
        rename: Option<HashMap<String, String>>,
    ) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.inner.load_targets(filename, rename.as_ref())?))
    }

    fn scale_from_table(&self, df: PyDataFrame, targets: PyDataFrame) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.inner.scale_from_table(&df.0, &targets.0)?))
    }

    fn synthesize_from_table(
        &mut self,
        df: PyDataFrame,
        geo_df: PyDataFrame,
        targets: PyDataFrame,
    ) -> PyResult<(PyDataFrame, Vec<PySynthesisOutcome>)> {
        let result = self.inner.synthesize_from_table(&df.0, &geo_df.0, &targets.0)?;
        Ok(with_outcomes(result))
    }
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTargetsModel>()?;
    m.add_class::<PySynthesisOutcome>()?;
    m.add_function(wrap_pyfunction!(py_apply_filter, m)?)?;
    m.add_function(wrap_pyfunction!(py_scale_col_to_target, m)?)?;
    m.add_function(wrap_pyfunction!(py_scale_to_targets, m)?)?;
    m.add_function(wrap_pyfunction!(py_scale_to_targets_from_table, m)?)?;
    m.add_function(wrap_pyfunction!(py_allocate_rows, m)?)?;
    m.add_function(wrap_pyfunction!(py_add_or_remove_rows, m)?)?;
    m.add_function(wrap_pyfunction!(py_synthesize_one, m)?)?;
    m.add_function(wrap_pyfunction!(py_synthesize_from_table, m)?)?;
    Ok(())
}
