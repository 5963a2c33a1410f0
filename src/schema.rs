//! Column-name constants for spandex-targets tables.
//! Single source of truth - exported to Python via PyO3.

// ── Agent table columns ─────────────────────────────────────────────────────
pub mod table {
    /// Row identity. Int64, unique within a table.
    pub const INDEX: &str = "index";
}

// ── Container table columns ─────────────────────────────────────────────────
pub mod container {
    pub const CONTAINER_ID: &str = "container_id";
}

// ── Scaling targets table ───────────────────────────────────────────────────
pub mod scaling_targets {
    pub const COLUMN_NAME: &str = "column_name";
    pub const TARGET_VALUE: &str = "target_value";
    pub const TARGET_METRIC: &str = "target_metric";
    pub const FILTERS: &str = "filters";
    pub const CLIP_LOW: &str = "clip_low";
    pub const CLIP_HIGH: &str = "clip_high";
    pub const INT_RESULT: &str = "int_result";

    pub const REQUIRED: [&str; 3] = [COLUMN_NAME, TARGET_VALUE, TARGET_METRIC];
}

// ── Synthesis targets table ─────────────────────────────────────────────────
pub mod synthesis_targets {
    pub const TARGET_VALUE: &str = "target_value";
    pub const GEO_ID_COL: &str = "geo_id_col";
    pub const FILTERS: &str = "filters";
    pub const COUNT: &str = "count";
    pub const CAPACITY_COL: &str = "capacity_col";
    pub const CAPACITY_EXPR: &str = "capacity_expr";
    pub const STUFF: &str = "stuff";

    pub const REQUIRED: [&str; 2] = [TARGET_VALUE, GEO_ID_COL];
}

// ── Metric names ────────────────────────────────────────────────────────────
pub mod metric {
    pub const MEAN: &str = "mean";
    pub const MEDIAN: &str = "median";
    pub const SUM: &str = "sum";
}
