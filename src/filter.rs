use polars::prelude::*;

use crate::error::TargetsError;
use crate::expr;

/// Row filter: nothing, one predicate, or several predicates ANDed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filters {
    #[default]
    None,
    One(String),
    All(Vec<String>),
}

impl Filters {
    /// Split a comma-separated cell from a targets table.
    /// Blank cells mean no filtering.
    pub fn from_cell(cell: Option<&str>) -> Self {
        match cell.map(str::trim) {
            None | Some("") => Filters::None,
            Some(s) => {
                let parts: Vec<String> = s
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect();
                match parts.len() {
                    0 => Filters::None,
                    1 => Filters::One(parts.into_iter().next().unwrap_or_default()),
                    _ => Filters::All(parts),
                }
            }
        }
    }

    /// The query text as a single `and`-joined string.
    pub fn query(&self) -> Option<String> {
        match self {
            Filters::None => None,
            Filters::One(s) => Some(s.clone()),
            Filters::All(parts) if parts.is_empty() => None,
            Filters::All(parts) => Some(
                parts
                    .iter()
                    .map(|p| format!("({p})"))
                    .collect::<Vec<_>>()
                    .join(" and "),
            ),
        }
    }
}

impl From<&str> for Filters {
    fn from(s: &str) -> Self {
        Filters::One(s.to_string())
    }
}

impl From<String> for Filters {
    fn from(s: String) -> Self {
        Filters::One(s)
    }
}

impl From<Vec<String>> for Filters {
    fn from(parts: Vec<String>) -> Self {
        Filters::All(parts)
    }
}

impl From<Option<String>> for Filters {
    fn from(s: Option<String>) -> Self {
        s.map(Filters::One).unwrap_or_default()
    }
}

/// Compile the filters into one boolean predicate over `schema`.
pub fn predicate(filters: &Filters, schema: &Schema) -> Result<Option<Expr>, TargetsError> {
    let Some(query) = filters.query() else {
        return Ok(None);
    };
    let expr = expr::compile(&query, schema).map_err(|reason| TargetsError::InvalidFilter {
        filter: query.clone(),
        reason,
    })?;
    Ok(Some(expr))
}

/// Filter `df` down to the rows matching `filters`.
///
/// `Filters::None` returns the table unchanged. Row order and the index
/// column are preserved.
pub fn apply_filter(df: &DataFrame, filters: &Filters) -> Result<DataFrame, TargetsError> {
    let Some(pred) = predicate(filters, df.schema())? else {
        return Ok(df.clone());
    };
    df.clone()
        .lazy()
        .filter(pred)
        .collect()
        .map_err(|e| TargetsError::InvalidFilter {
            filter: filters.query().unwrap_or_default(),
            reason: e.to_string(),
        })
}
