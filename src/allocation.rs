use indexmap::IndexMap;
use polars::prelude::*;
use tracing::debug;

use crate::error::TargetsError;

/// Remaining capacity per container key, in fill-priority order.
pub type Constraint = IndexMap<String, f64>;

/// How the rows passed to [`allocate_rows`] were placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationReport {
    /// Rows placed within a container's remaining capacity.
    pub placed: usize,
    /// Rows placed round-robin beyond capacity.
    pub stuffed: usize,
    /// Rows left without a container.
    pub unplaced: usize,
}

/// Assign a container key to every row of `rows_to_add`, in place.
///
/// Containers are filled in `constraint` order, one unit of capacity per
/// row, while at least one whole unit remains. Rows left over once all
/// capacity is spent are spread round-robin over every container (starting
/// again from the first) when `stuff` is set, otherwise their
/// `alloc_column` is set to null.
///
/// The allocation column keeps its dtype when `rows_to_add` already has it
/// and is created as a String column otherwise.
pub fn allocate_rows(
    rows_to_add: &mut DataFrame,
    alloc_column: &str,
    constraint: &Constraint,
    stuff: bool,
) -> Result<AllocationReport, TargetsError> {
    let (keys, report) = assign_keys(rows_to_add.height(), constraint, stuff);

    if report.stuffed > 0 {
        debug!(
            stuffed = report.stuffed,
            "capacity exhausted, stuffing rows round-robin"
        );
    }
    if report.unplaced > 0 {
        debug!(unplaced = report.unplaced, "capacity exhausted, rows left unplaced");
    }

    let mut column = Column::new(alloc_column.into(), keys);
    if let Ok(existing) = rows_to_add.column(alloc_column) {
        let dtype = existing.dtype().clone();
        if dtype != DataType::String && dtype != DataType::Null {
            column = column.cast(&dtype)?;
        }
    }
    rows_to_add.with_column(column)?;

    Ok(report)
}

fn assign_keys(
    n_rows: usize,
    constraint: &Constraint,
    stuff: bool,
) -> (Vec<Option<String>>, AllocationReport) {
    let mut keys: Vec<Option<String>> = Vec::with_capacity(n_rows);
    let mut report = AllocationReport::default();

    for (key, &capacity) in constraint {
        let mut remaining = capacity;
        while remaining >= 1.0 && keys.len() < n_rows {
            keys.push(Some(key.clone()));
            remaining -= 1.0;
        }
        if keys.len() == n_rows {
            break;
        }
    }
    report.placed = keys.len();

    let overflow = n_rows - keys.len();
    if stuff && !constraint.is_empty() {
        keys.extend(
            constraint
                .keys()
                .cycle()
                .take(overflow)
                .map(|k| Some(k.clone())),
        );
        report.stuffed = overflow;
    } else {
        keys.extend(std::iter::repeat(None).take(overflow));
        report.unplaced = overflow;
    }

    (keys, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::table;

    fn constraint() -> Constraint {
        [("a", 0.0), ("b", 1.0), ("c", 3.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn rows(n: usize) -> DataFrame {
        let ids = ["a", "b", "c", "b", "c"];
        df!(
            table::INDEX => (0..n as i64).collect::<Vec<_>>(),
            "thing_id" => ids[..n].to_vec(),
            "number" => (1..=n as i64).collect::<Vec<_>>(),
        )
        .unwrap()
    }

    fn allocated(df: &DataFrame) -> Vec<Option<String>> {
        crate::frame::key_values(df, "thing_id").unwrap()
    }

    fn keys(expected: &[Option<&str>]) -> Vec<Option<String>> {
        expected.iter().map(|k| k.map(str::to_string)).collect()
    }

    #[test]
    fn fills_containers_in_order() {
        let mut df = rows(2);
        let report = allocate_rows(&mut df, "thing_id", &constraint(), false).unwrap();

        assert_eq!(allocated(&df), keys(&[Some("b"), Some("c")]));
        assert_eq!(report.placed, 2);
        assert_eq!(crate::frame::numeric_values(&df, "number").unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn stuffing_wraps_to_first_container() {
        let mut df = rows(5);
        let report = allocate_rows(&mut df, "thing_id", &constraint(), true).unwrap();

        assert_eq!(
            allocated(&df),
            keys(&[Some("b"), Some("c"), Some("c"), Some("c"), Some("a")])
        );
        assert_eq!(
            report,
            AllocationReport {
                placed: 4,
                stuffed: 1,
                unplaced: 0
            }
        );
    }

    #[test]
    fn overflow_without_stuffing_is_unplaced() {
        let mut df = rows(5);
        let report = allocate_rows(&mut df, "thing_id", &constraint(), false).unwrap();

        assert_eq!(
            allocated(&df),
            keys(&[Some("b"), Some("c"), Some("c"), Some("c"), None])
        );
        assert_eq!(report.unplaced, 1);
    }

    #[test]
    fn round_robin_cycles_through_every_container() {
        let constraint: Constraint = [("a", 1.0), ("b", 0.0), ("c", 0.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let (assigned, _) = assign_keys(6, &constraint, true);
        assert_eq!(
            assigned,
            keys(&[Some("a"), Some("a"), Some("b"), Some("c"), Some("a"), Some("b")])
        );
    }

    #[test]
    fn fractional_capacity_is_never_consumed() {
        let constraint: Constraint = [("a", 1.5), ("b", 0.9)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let (assigned, report) = assign_keys(3, &constraint, false);
        assert_eq!(assigned, keys(&[Some("a"), None, None]));
        assert_eq!(report.unplaced, 2);
    }

    #[test]
    fn empty_constraint_leaves_everything_unplaced() {
        let (assigned, report) = assign_keys(2, &Constraint::new(), true);
        assert_eq!(assigned, vec![None, None]);
        assert_eq!(report.unplaced, 2);
    }

    #[test]
    fn integer_allocation_column_keeps_its_dtype() {
        let mut df = df!(
            table::INDEX => [0i64, 1],
            "zone_id" => [1i64, 2],
        )
        .unwrap();
        let constraint: Constraint = [("3".to_string(), 5.0)].into_iter().collect();
        allocate_rows(&mut df, "zone_id", &constraint, false).unwrap();

        assert_eq!(df.column("zone_id").unwrap().dtype(), &DataType::Int64);
        assert_eq!(
            crate::frame::numeric_values(&df, "zone_id").unwrap(),
            vec![3.0, 3.0]
        );
    }
}
