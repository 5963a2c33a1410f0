/// Settings for a [`crate::model::TargetsModel`] session.
#[derive(Debug, Clone)]
pub struct TargetsConfig {
    /// Seed for row sampling. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    /// Field separator for CSV input.
    pub csv_separator: u8,
    /// Rows scanned to infer CSV column types for agent and container
    /// tables. `None` scans the whole file.
    pub infer_schema_length: Option<usize>,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            seed: None,
            csv_separator: b',',
            infer_schema_length: Some(1000),
        }
    }
}

impl TargetsConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_csv_separator(mut self, separator: u8) -> Self {
        self.csv_separator = separator;
        self
    }
}
