//! Scale agent attributes and synthesize agent rows so tables match
//! aggregate targets, allocating new rows to capacity-limited containers.

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyModule;

pub mod allocation;
pub mod config;
pub mod driver;
pub mod error;
pub mod expr;
pub mod filter;
pub mod frame;
pub mod model;
pub mod rng;
pub mod rules;
pub mod scaling;
pub mod schema;
pub mod synthesis;

#[cfg(feature = "python")]
mod python;

pub use allocation::{allocate_rows, AllocationReport, Constraint};
pub use config::TargetsConfig;
pub use driver::{synthesize_from_table, synthesize_one, TableSynthesis};
pub use error::TargetsError;
pub use filter::{apply_filter, Filters};
pub use model::TargetsModel;
pub use rng::TargetsRng;
pub use rules::{ScalingRule, SynthesisRule};
pub use scaling::{scale_col_to_target, scale_to_targets, scale_to_targets_from_table, Metric};
pub use synthesis::{add_or_remove_rows, SynthesisOutcome, Synthesized};

/// Export schema constants as Python submodules
#[cfg(feature = "python")]
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Table
    let table = PyModule::new(m.py(), "table")?;
    table.add("INDEX", schema::table::INDEX)?;
    m.add_submodule(&table)?;

    // Container
    let container = PyModule::new(m.py(), "container")?;
    container.add("CONTAINER_ID", schema::container::CONTAINER_ID)?;
    m.add_submodule(&container)?;

    // Scaling targets
    let scaling_targets = PyModule::new(m.py(), "scaling_targets")?;
    scaling_targets.add("COLUMN_NAME", schema::scaling_targets::COLUMN_NAME)?;
    scaling_targets.add("TARGET_VALUE", schema::scaling_targets::TARGET_VALUE)?;
    scaling_targets.add("TARGET_METRIC", schema::scaling_targets::TARGET_METRIC)?;
    scaling_targets.add("FILTERS", schema::scaling_targets::FILTERS)?;
    scaling_targets.add("CLIP_LOW", schema::scaling_targets::CLIP_LOW)?;
    scaling_targets.add("CLIP_HIGH", schema::scaling_targets::CLIP_HIGH)?;
    scaling_targets.add("INT_RESULT", schema::scaling_targets::INT_RESULT)?;
    m.add_submodule(&scaling_targets)?;

    // Synthesis targets
    let synthesis_targets = PyModule::new(m.py(), "synthesis_targets")?;
    synthesis_targets.add("TARGET_VALUE", schema::synthesis_targets::TARGET_VALUE)?;
    synthesis_targets.add("GEO_ID_COL", schema::synthesis_targets::GEO_ID_COL)?;
    synthesis_targets.add("FILTERS", schema::synthesis_targets::FILTERS)?;
    synthesis_targets.add("COUNT", schema::synthesis_targets::COUNT)?;
    synthesis_targets.add("CAPACITY_COL", schema::synthesis_targets::CAPACITY_COL)?;
    synthesis_targets.add("CAPACITY_EXPR", schema::synthesis_targets::CAPACITY_EXPR)?;
    synthesis_targets.add("STUFF", schema::synthesis_targets::STUFF)?;
    m.add_submodule(&synthesis_targets)?;

    // Metric
    let metric = PyModule::new(m.py(), "metric")?;
    metric.add("MEAN", schema::metric::MEAN)?;
    metric.add("MEDIAN", schema::metric::MEDIAN)?;
    metric.add("SUM", schema::metric::SUM)?;
    m.add_submodule(&metric)?;

    Ok(())
}

#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register(m)?;
    add_schema_exports(m)?;
    Ok(())
}
