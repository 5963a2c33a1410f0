use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, info};

use crate::config::TargetsConfig;
use crate::driver::{self, TableSynthesis};
use crate::error::TargetsError;
use crate::frame;
use crate::rng::TargetsRng;
use crate::scaling;

/// Loads agent, container and targets tables from a directory and runs
/// the table drivers with one reproducible random stream.
#[derive(Debug, Clone)]
pub struct TargetsModel {
    base_path: PathBuf,
    config: TargetsConfig,
    rng: TargetsRng,
}

impl TargetsModel {
    pub fn new(base_path: impl Into<PathBuf>, config: TargetsConfig) -> Self {
        let rng = TargetsRng::from_optional_seed(config.seed);
        Self {
            base_path: base_path.into(),
            config,
            rng,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn config(&self) -> &TargetsConfig {
        &self.config
    }

    /// Restart the random stream from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.config.seed = Some(seed);
        self.rng = TargetsRng::from_seed_u64(seed);
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load an agent or container table.
    ///
    /// `.parquet` files are read as Parquet, anything else as CSV with
    /// column types inferred. Column names are trimmed and an `index` column
    /// is attached when the file has none.
    pub fn load_table(&self, filename: &str) -> Result<DataFrame, TargetsError> {
        let path = self.base_path.join(filename);
        let is_parquet = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));

        let mut df = if is_parquet {
            ParquetReader::new(File::open(&path)?).finish()?
        } else {
            self.read_csv(&path, self.config.infer_schema_length)?
        };
        trim_column_names(&mut df)?;
        let df = frame::ensure_row_index(df)?;

        debug!(path = %path.display(), rows = df.height(), "loaded table");
        Ok(df)
    }

    /// Load a scaling or synthesis targets table with all columns as
    /// strings. Optionally rename columns via a map.
    pub fn load_targets(
        &self,
        filename: &str,
        rename: Option<&HashMap<String, String>>,
    ) -> Result<DataFrame, TargetsError> {
        let path = self.base_path.join(filename);
        let mut df = self.read_csv(&path, Some(0))?;
        trim_column_names(&mut df)?;

        if let Some(map) = rename {
            let old: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
            let new: Vec<&str> = map.values().map(|s| s.as_str()).collect();
            df = df.lazy().rename(old, new, true).collect()?;
        }

        debug!(path = %path.display(), rules = df.height(), "loaded targets");
        Ok(df)
    }

    // ── Drivers ─────────────────────────────────────────────────────────────

    /// Scale columns of `df` following a scaling targets table.
    pub fn scale_from_table(
        &self,
        df: &DataFrame,
        targets: &DataFrame,
    ) -> Result<DataFrame, TargetsError> {
        let df = frame::ensure_row_index(df.clone())?;
        info!(rules = targets.height(), "scaling from targets table");
        scaling::scale_to_targets_from_table(&df, targets)
    }

    /// Add and remove rows of `df` following a synthesis targets table,
    /// allocating new rows to the containers of `geo_df`.
    pub fn synthesize_from_table(
        &mut self,
        df: &DataFrame,
        geo_df: &DataFrame,
        targets: &DataFrame,
    ) -> Result<TableSynthesis, TargetsError> {
        info!(rules = targets.height(), "synthesizing from targets table");
        driver::synthesize_from_table(df, geo_df, targets, &mut self.rng)
    }

    /// Load the three tables by name and run [`Self::synthesize_from_table`].
    pub fn synthesize_files(
        &mut self,
        agents: &str,
        containers: &str,
        targets: &str,
    ) -> Result<TableSynthesis, TargetsError> {
        let df = self.load_table(agents)?;
        let geo_df = self.load_table(containers)?;
        let targets = self.load_targets(targets, None)?;
        self.synthesize_from_table(&df, &geo_df, &targets)
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    fn read_csv(
        &self,
        path: &Path,
        infer_schema_length: Option<usize>,
    ) -> Result<DataFrame, TargetsError> {
        let separator = self.config.csv_separator;
        Ok(CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(infer_schema_length)
            .map_parse_options(|opts| opts.with_separator(separator))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?)
    }
}

fn trim_column_names(df: &mut DataFrame) -> Result<(), TargetsError> {
    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;
    Ok(())
}
