//! Change sets exposed to consumers that only want what the last
//! notification changed.

use crate::tree::NodeId;
use alloc::vec::Vec;
use core::ops::Range;
use hashbrown::HashMap;
use rill_core::Scalar;

/// One changed cell, in view coordinates after the notification.
#[derive(Clone, Debug, PartialEq)]
pub struct CellUpdate {
    pub row: usize,
    pub column: usize,
    pub old_value: Scalar,
    pub new_value: Scalar,
}

/// Cells changed by the last notification.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepDelta {
    /// Rows were added, removed or reordered.
    pub rows_changed: bool,
    /// Columns were added, removed or reordered.
    pub columns_changed: bool,
    pub cells: Vec<CellUpdate>,
}

impl StepDelta {
    /// Restricts the cells to rows in `rows`.
    pub fn window(&self, rows: Range<usize>) -> StepDelta {
        StepDelta {
            rows_changed: self.rows_changed,
            columns_changed: self.columns_changed,
            cells: self
                .cells
                .iter()
                .filter(|c| rows.contains(&c.row))
                .cloned()
                .collect(),
        }
    }

    /// Distinct changed rows, ascending.
    pub fn changed_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self.cells.iter().map(|c| c.row).collect();
        rows.sort_unstable();
        rows.dedup();
        rows
    }
}

/// Rows changed by the last notification.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowDelta {
    pub rows_changed: bool,
    pub rows: Vec<usize>,
}

impl From<&StepDelta> for RowDelta {
    fn from(step: &StepDelta) -> Self {
        RowDelta {
            rows_changed: step.rows_changed,
            rows: step.changed_rows(),
        }
    }
}

/// Read access to a pivoted context's visible grid.
pub(crate) trait Grid {
    fn grid_rows(&self) -> usize;
    fn grid_columns(&self) -> usize;
    fn grid_row_path(&self, row: usize) -> Vec<Scalar>;
    fn grid_column_path(&self, column: usize) -> Vec<Scalar>;
    fn grid_data(&self, rows: Range<usize>, columns: Range<usize>) -> Vec<Scalar>;
}

/// The visible grid captured before a notification, diffed by path after it.
pub(crate) struct GridSnapshot {
    rows: Vec<Vec<Scalar>>,
    columns: Vec<Vec<Scalar>>,
    data: Vec<Scalar>,
}

impl GridSnapshot {
    pub fn capture(grid: &impl Grid) -> Self {
        let (nrows, ncols) = (grid.grid_rows(), grid.grid_columns());
        Self {
            rows: (0..nrows).map(|r| grid.grid_row_path(r)).collect(),
            columns: (0..ncols).map(|c| grid.grid_column_path(c)).collect(),
            data: grid.grid_data(0..nrows, 0..ncols),
        }
    }

    pub fn diff(&self, grid: &impl Grid) -> StepDelta {
        let after = GridSnapshot::capture(grid);
        let row_index: HashMap<&[Scalar], usize> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, p)| (p.as_slice(), i))
            .collect();
        let column_index: HashMap<&[Scalar], usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, p)| (p.as_slice(), i))
            .collect();

        let old_cols = self.columns.len();
        let new_cols = after.columns.len();
        let mut cells = Vec::new();
        for (row, path) in after.rows.iter().enumerate() {
            let old_row = row_index.get(path.as_slice()).copied();
            for (column, cpath) in after.columns.iter().enumerate() {
                let old_value = match (old_row, column_index.get(cpath.as_slice())) {
                    (Some(r), Some(&c)) => self.data[r * old_cols + c].clone(),
                    _ => Scalar::Null,
                };
                let new_value = after.data[row * new_cols + column].clone();
                if old_value != new_value || old_value.data_type() != new_value.data_type() {
                    cells.push(CellUpdate {
                        row,
                        column,
                        old_value,
                        new_value,
                    });
                }
            }
        }
        StepDelta {
            rows_changed: self.rows != after.rows,
            columns_changed: self.columns != after.columns,
            cells,
        }
    }
}

/// A touched cell's display position and visible values before the
/// notification changed it.
#[derive(Debug)]
struct Before {
    row: Option<usize>,
    column: Option<usize>,
    values: Option<Vec<Scalar>>,
}

/// Cells whose aggregates a notification touched, keyed by row path then
/// column path. Each cell is captured at its first touch, before its state
/// changes, so only touched cells are compared afterwards.
///
/// Columns are column-tree nodes; each displayed node spans one grid column
/// per visible aggregate.
///
/// `rows_changed` and `columns_changed` come from the logged positions;
/// an untouched node only moves when a touched one does.
pub(crate) struct TouchLog {
    row_count: usize,
    column_count: usize,
    row_index: HashMap<NodeId, usize>,
    column_index: HashMap<NodeId, usize>,
    before: HashMap<Vec<Scalar>, HashMap<Vec<Scalar>, Before>>,
}

fn positions(ids: &[NodeId]) -> HashMap<NodeId, usize> {
    ids.iter().enumerate().map(|(i, &id)| (id, i)).collect()
}

impl TouchLog {
    /// Starts a log over the displayed row and column nodes.
    pub fn new(rows: &[NodeId], columns: &[NodeId]) -> Self {
        Self {
            row_count: rows.len(),
            column_count: columns.len(),
            row_index: positions(rows),
            column_index: positions(columns),
            before: HashMap::new(),
        }
    }

    /// Records the cell at `(row_path, column_path)` unless already logged.
    /// `ids` is `None` when either node does not exist yet.
    pub fn touch(
        &mut self,
        row_path: &[Scalar],
        column_path: &[Scalar],
        ids: Option<(NodeId, NodeId)>,
        values: impl FnOnce(NodeId, NodeId) -> Vec<Scalar>,
    ) {
        if self
            .before
            .get(row_path)
            .map_or(false, |by_column| by_column.contains_key(column_path))
        {
            return;
        }
        let row = ids.and_then(|(r, _)| self.row_index.get(&r).copied());
        let column = ids.and_then(|(_, c)| self.column_index.get(&c).copied());
        let values = match (ids, row, column) {
            (Some((r, c)), Some(_), Some(_)) => Some(values(r, c)),
            _ => None,
        };
        self.before
            .entry(row_path.to_vec())
            .or_default()
            .insert(column_path.to_vec(), Before { row, column, values });
    }

    /// Drops a pruned row node so a recycled id is not mistaken for it.
    pub fn forget_row(&mut self, id: NodeId) {
        self.row_index.remove(&id);
    }

    /// Drops a pruned column node.
    pub fn forget_column(&mut self, id: NodeId) {
        self.column_index.remove(&id);
    }

    /// Compares every logged cell against the grid after the notification.
    /// `locate` finds the nodes of a path pair and `values` reads a cell's
    /// visible aggregates.
    pub fn finish(
        self,
        rows: &[NodeId],
        columns: &[NodeId],
        locate: impl Fn(&[Scalar], &[Scalar]) -> Option<(NodeId, NodeId)>,
        values: impl Fn(NodeId, NodeId) -> Vec<Scalar>,
    ) -> StepDelta {
        let row_index = positions(rows);
        let column_index = positions(columns);
        let mut rows_changed = self.row_count != rows.len();
        let mut columns_changed = self.column_count != columns.len();
        let mut cells = Vec::new();
        for (row_path, by_column) in &self.before {
            for (column_path, before) in by_column {
                let ids = locate(row_path, column_path);
                let row = ids.and_then(|(r, _)| row_index.get(&r).copied());
                let column = ids.and_then(|(_, c)| column_index.get(&c).copied());
                rows_changed |= row != before.row;
                columns_changed |= column != before.column;
                let (Some((r, c)), Some(row), Some(column)) = (ids, row, column) else {
                    continue;
                };
                let after = values(r, c);
                let width = after.len();
                for (agg, new_value) in after.into_iter().enumerate() {
                    let old_value = before
                        .values
                        .as_ref()
                        .and_then(|v| v.get(agg).cloned())
                        .unwrap_or(Scalar::Null);
                    if old_value != new_value || old_value.data_type() != new_value.data_type() {
                        cells.push(CellUpdate {
                            row,
                            column: column * width + agg,
                            old_value,
                            new_value,
                        });
                    }
                }
            }
        }
        cells.sort_unstable_by_key(|c| (c.row, c.column));
        StepDelta {
            rows_changed,
            columns_changed,
            cells,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    struct Fixed {
        rows: Vec<Vec<Scalar>>,
        data: Vec<Scalar>,
    }

    impl Grid for Fixed {
        fn grid_rows(&self) -> usize {
            self.rows.len()
        }
        fn grid_columns(&self) -> usize {
            1
        }
        fn grid_row_path(&self, row: usize) -> Vec<Scalar> {
            self.rows[row].clone()
        }
        fn grid_column_path(&self, _column: usize) -> Vec<Scalar> {
            vec![Scalar::str("v")]
        }
        fn grid_data(&self, rows: Range<usize>, _columns: Range<usize>) -> Vec<Scalar> {
            self.data[rows].to_vec()
        }
    }

    #[test]
    fn test_diff_by_path() {
        let before = Fixed {
            rows: vec![vec![], vec![Scalar::str("A")]],
            data: vec![Scalar::Int64(10), Scalar::Int64(10)],
        };
        let snapshot = GridSnapshot::capture(&before);
        let after = Fixed {
            rows: vec![vec![], vec![Scalar::str("A")], vec![Scalar::str("B")]],
            data: vec![Scalar::Int64(17), Scalar::Int64(10), Scalar::Int64(7)],
        };
        let delta = snapshot.diff(&after);
        assert!(delta.rows_changed);
        assert!(!delta.columns_changed);
        assert_eq!(delta.changed_rows(), vec![0, 2]);
        assert_eq!(delta.cells[1].old_value, Scalar::Null);
        assert_eq!(delta.window(1..3).cells.len(), 1);
        assert_eq!(RowDelta::from(&delta).rows, vec![0, 2]);
    }

    #[test]
    fn test_touch_log_compares_touched_cells_only() {
        // Rows: root (id 0) then "A" (id 1); one column node (id 0).
        let mut log = TouchLog::new(&[0, 1], &[0]);
        let a = [Scalar::str("A")];
        log.touch(&[], &[], Some((0, 0)), |_, _| vec![Scalar::Int64(10)]);
        log.touch(&a, &[], Some((1, 0)), |_, _| vec![Scalar::Int64(10)]);
        // A second touch keeps the first capture.
        log.touch(&a, &[], Some((1, 0)), |_, _| vec![Scalar::Int64(99)]);
        log.touch(&[Scalar::str("B")], &[], None, |_, _| unreachable!());

        let locate = |row: &[Scalar], _: &[Scalar]| match row {
            [] => Some((0, 0)),
            [v] if *v == Scalar::str("A") => Some((1, 0)),
            [v] if *v == Scalar::str("B") => Some((2, 0)),
            _ => None,
        };
        let delta = log.finish(&[0, 1, 2], &[0], locate, |r, _| match r {
            0 => vec![Scalar::Int64(17)],
            1 => vec![Scalar::Int64(10)],
            _ => vec![Scalar::Int64(7)],
        });
        assert!(delta.rows_changed);
        assert!(!delta.columns_changed);
        assert_eq!(delta.changed_rows(), vec![0, 2]);
        assert_eq!(delta.cells[1].old_value, Scalar::Null);
        assert_eq!(delta.cells[1].new_value, Scalar::Int64(7));
    }

    #[test]
    fn test_touch_log_ignores_recycled_ids() {
        // "A" (id 1) is pruned and its id reused by "B" at the same row.
        let mut log = TouchLog::new(&[0, 1], &[0]);
        let a = [Scalar::str("A")];
        let b = [Scalar::str("B")];
        log.touch(&a, &[], Some((1, 0)), |_, _| vec![Scalar::Int64(5)]);
        log.forget_row(1);
        log.touch(&b, &[], Some((1, 0)), |_, _| vec![Scalar::Int64(5)]);
        let locate = |row: &[Scalar], _: &[Scalar]| (row == b.as_slice()).then_some((1, 0));
        let delta = log.finish(&[0, 1], &[0], locate, |_, _| vec![Scalar::Int64(5)]);
        assert!(delta.rows_changed);
        assert_eq!(delta.cells.len(), 1);
        assert_eq!(delta.cells[0].old_value, Scalar::Null);
    }
}
