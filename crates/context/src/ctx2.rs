//! Two-sided context: a row tree crossed with a column tree.
//!
//! Aggregate state lives in cells keyed by `(row node, column node)`; a
//! notified row updates every cell of its row ancestors crossed with its
//! column ancestors, column root included. The row root is the total row,
//! the column root the total column (never displayed).

use crate::aggregate::{percent_of, AggState, Aggregate};
use crate::config::{ResolvedAgg, ResolvedConfig, ViewConfig};
use crate::ctx1::visible_aggs;
use crate::delta::{Grid, GridSnapshot, RowDelta, StepDelta, TouchLog};
use crate::expand::Expansion;
use crate::notify::{
    apply_in_place, classify_row, in_place_changes, AggChange, Bindings, Contribution, Image,
    NotifyTables, RowChange,
};
use crate::sort::{sort_siblings, SortSpec};
use crate::tree::{NodeId, SparseTree, ROOT};
use crate::Axis;
use alloc::vec::Vec;
use core::ops::Range;
use hashbrown::HashMap;
use rill_core::{DataTable, Result, Scalar, Schema};

#[derive(Clone, Debug)]
struct Cell {
    count: usize,
    aggs: Vec<AggState>,
}

impl Cell {
    fn new(aggs: &[ResolvedAgg]) -> Self {
        Self {
            count: 0,
            aggs: aggs.iter().map(|a| AggState::new(a.aggregate())).collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ctx2 {
    view: ViewConfig,
    config: ResolvedConfig,
    bindings: Bindings,
    rows: SparseTree<()>,
    columns: SparseTree<()>,
    cells: HashMap<(NodeId, NodeId), Cell>,
    row_expansion: Expansion,
    column_expansion: Expansion,
    row_traversal: Vec<NodeId>,
    /// Displayed column nodes, with whether each is an expanded header.
    column_traversal: Vec<(NodeId, bool)>,
    visible: Vec<usize>,
    deltas_enabled: bool,
    step: StepDelta,
}

impl Ctx2 {
    pub fn new(view: &ViewConfig, schema: &Schema) -> Result<Self> {
        let config = view.resolve(schema)?;
        let bindings = Bindings::new(&config, schema)?;
        let mut ctx = Self {
            view: view.clone(),
            row_expansion: Expansion::new(config.row_depth, config.row_pivots.len()),
            column_expansion: Expansion::new(config.column_depth, config.column_pivots.len()),
            visible: visible_aggs(&config),
            config,
            bindings,
            rows: SparseTree::new(()),
            columns: SparseTree::new(()),
            cells: HashMap::new(),
            row_traversal: Vec::new(),
            column_traversal: Vec::new(),
            deltas_enabled: false,
            step: StepDelta::default(),
        };
        ctx.rebuild();
        Ok(ctx)
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn view_config(&self) -> &ViewConfig {
        &self.view
    }

    fn add(&mut self, image: &Image<'_>, touched: Option<&mut TouchLog>) {
        let row_path = image.path(&self.bindings.row_pivots);
        let column_path = image.path(&self.bindings.column_pivots);
        if let Some(touched) = touched {
            self.log_cells(touched, &row_path, &column_path);
        }
        let rids = self.rows.path_ids(&row_path, || ());
        let cids = self.columns.path_ids(&column_path, || ());
        self.rows.adjust_counts(&rids, true);
        self.columns.adjust_counts(&cids, true);
        let contribution = Contribution::of(image, &self.bindings);
        let aggs = &self.config.aggs;
        for &r in &rids {
            for &c in &cids {
                let cell = self.cells.entry((r, c)).or_insert_with(|| Cell::new(aggs));
                cell.count += 1;
                contribution.add_to(&mut cell.aggs);
            }
        }
    }

    /// Row and column ancestors of an existing cell, with its paths.
    fn leaves(&self, image: &Image<'_>) -> Option<(Vec<NodeId>, Vec<NodeId>, Vec<Scalar>, Vec<Scalar>)> {
        let row_path = image.path(&self.bindings.row_pivots);
        let column_path = image.path(&self.bindings.column_pivots);
        let r = self.rows.find(&row_path)?;
        let c = self.columns.find(&column_path)?;
        Some((self.rows.ancestors(r), self.columns.ancestors(c), row_path, column_path))
    }

    fn remove(&mut self, image: &Image<'_>, mut touched: Option<&mut TouchLog>) {
        let Some((rids, cids, row_path, column_path)) = self.leaves(image) else {
            log::warn!("retracting a row from a missing pivot cell");
            return;
        };
        if let Some(touched) = touched.as_deref_mut() {
            self.log_cells(touched, &row_path, &column_path);
        }
        let contribution = Contribution::of(image, &self.bindings);
        for &r in &rids {
            for &c in &cids {
                let emptied = match self.cells.get_mut(&(r, c)) {
                    Some(cell) => {
                        contribution.retract_from(&mut cell.aggs);
                        cell.count = cell.count.saturating_sub(1);
                        cell.count == 0
                    }
                    None => false,
                };
                if emptied {
                    self.cells.remove(&(r, c));
                }
            }
        }
        self.rows.adjust_counts(&rids, false);
        self.columns.adjust_counts(&cids, false);
        let pruned = self.rows.prune(&rids) + self.columns.prune(&cids);
        if let (Some(touched), true) = (touched, pruned > 0) {
            for &r in rids.iter().filter(|&&r| self.rows.get(r).is_none()) {
                touched.forget_row(r);
            }
            for &c in cids.iter().filter(|&&c| self.columns.get(c).is_none()) {
                touched.forget_column(c);
            }
        }
    }

    fn update_in_place(
        &mut self,
        tables: &NotifyTables<'_>,
        prev: &Image<'_>,
        cur: &Image<'_>,
        row: usize,
        touched: Option<&mut TouchLog>,
    ) {
        let changes = in_place_changes(tables, &self.bindings, row);
        if changes.iter().all(|c| *c == AggChange::Skip) {
            return;
        }
        let Some((rids, cids, row_path, column_path)) = self.leaves(cur) else {
            return;
        };
        if let Some(touched) = touched {
            self.log_cells(touched, &row_path, &column_path);
        }
        let (prev, cur) = (
            Contribution::of(prev, &self.bindings),
            Contribution::of(cur, &self.bindings),
        );
        for &r in &rids {
            for &c in &cids {
                if let Some(cell) = self.cells.get_mut(&(r, c)) {
                    apply_in_place(&mut cell.aggs, &changes, &prev, &cur);
                }
            }
        }
    }

    /// Logs every row prefix crossed with every column prefix below the
    /// (never displayed) column root.
    fn log_cells(&self, touched: &mut TouchLog, row_path: &[Scalar], column_path: &[Scalar]) {
        let row_ids = self.rows.prefix_ids(row_path);
        let column_ids = self.columns.prefix_ids(column_path);
        for (rdepth, &r) in row_ids.iter().enumerate() {
            for (cdepth, &c) in column_ids.iter().enumerate().skip(1) {
                touched.touch(&row_path[..rdepth], &column_path[..cdepth], r.zip(c), |r, c| {
                    self.visible_values(r, c)
                });
            }
        }
    }

    fn visible_values(&self, r: NodeId, c: NodeId) -> Vec<Scalar> {
        self.visible.iter().map(|&agg| self.value(r, c, agg)).collect()
    }

    fn displayed_columns(&self) -> Vec<NodeId> {
        self.column_traversal.iter().map(|&(id, _)| id).collect()
    }

    /// Percentages read cells a batch never touches, so those views diff
    /// the whole grid.
    fn logs_touched_cells(&self) -> bool {
        !self.visible.iter().any(|&agg| self.config.aggs[agg].aggregate().is_relative())
    }

    pub fn notify(&mut self, tables: &NotifyTables<'_>) -> Result<()> {
        let snapshot = (self.deltas_enabled && !self.logs_touched_cells())
            .then(|| GridSnapshot::capture(&*self));
        let mut touched = (self.deltas_enabled && snapshot.is_none())
            .then(|| TouchLog::new(&self.row_traversal, &self.displayed_columns()));
        for row in 0..tables.num_rows() {
            match classify_row(tables, &self.bindings, &self.config.filter, row) {
                RowChange::None => {}
                RowChange::Add(cur) => self.add(&cur, touched.as_mut()),
                RowChange::Remove(prev) => self.remove(&prev, touched.as_mut()),
                RowChange::Move { prev, cur } => {
                    self.remove(&prev, touched.as_mut());
                    self.add(&cur, touched.as_mut());
                }
                RowChange::InPlace { prev, cur } => {
                    self.update_in_place(tables, &prev, &cur, row, touched.as_mut())
                }
            }
        }
        self.rebuild();
        if let Some(touched) = touched {
            self.step = touched.finish(
                &self.row_traversal,
                &self.displayed_columns(),
                |row, column| self.rows.find(row).zip(self.columns.find(column)),
                |r, c| self.visible_values(r, c),
            );
        } else if let Some(snapshot) = snapshot {
            self.step = snapshot.diff(&*self);
        }
        Ok(())
    }

    pub fn notify_initial(&mut self, snapshot: &DataTable) -> Result<()> {
        for row in 0..snapshot.size() {
            let image = Image::new(snapshot, row);
            if image.present(&self.bindings) && image.passes(&self.config.filter, &self.bindings) {
                self.add(&image, None);
            }
        }
        self.rebuild();
        Ok(())
    }

    fn sum_at(&self, r: NodeId, c: NodeId, agg: usize) -> Option<f64> {
        self.cells.get(&(r, c)).and_then(|cell| cell.aggs[agg].sum())
    }

    /// Value of aggregate `agg` in cell `(r, c)`.
    fn value(&self, r: NodeId, c: NodeId, agg: usize) -> Scalar {
        let spec = &self.config.aggs[agg];
        match spec.aggregate() {
            Aggregate::PctSumParent => {
                let parent = self.rows.node(r).parent.unwrap_or(r);
                percent_of(self.sum_at(r, c, agg), self.sum_at(parent, c, agg))
            }
            Aggregate::PctSumGrandTotal => {
                percent_of(self.sum_at(r, c, agg), self.sum_at(ROOT, ROOT, agg))
            }
            other => self
                .cells
                .get(&(r, c))
                .map_or(Scalar::Null, |cell| cell.aggs[agg].value(other, spec.input_type)),
        }
    }

    fn row_sort_key(&self, id: NodeId, sort: &SortSpec) -> Scalar {
        let node = self.rows.node(id);
        if node.depth > 0 && self.config.row_pivots.get(node.depth - 1) == Some(&sort.column) {
            return node.value.clone();
        }
        match self.config.agg_index(&sort.column) {
            Some(agg) => self.value(id, ROOT, agg),
            None => Scalar::Null,
        }
    }

    fn column_sort_key(&self, id: NodeId, sort: &SortSpec) -> Scalar {
        let node = self.columns.node(id);
        if node.depth > 0 && self.config.column_pivots.get(node.depth - 1) == Some(&sort.column) {
            return node.value.clone();
        }
        match self.config.agg_index(&sort.column) {
            Some(agg) => self.value(ROOT, id, agg),
            None => Scalar::Null,
        }
    }

    fn rebuild(&mut self) {
        let mut rows = alloc::vec![ROOT];
        self.walk_rows(ROOT, &mut Vec::new(), &mut rows);
        self.row_traversal = rows;

        let mut columns = Vec::new();
        let headers = !self.config.sorts.is_empty();
        self.walk_columns(ROOT, &mut Vec::new(), headers, &mut columns);
        self.column_traversal = columns;
    }

    fn walk_rows(&self, id: NodeId, path: &mut Vec<Scalar>, out: &mut Vec<NodeId>) {
        if !self.row_expansion.is_expanded(path) {
            return;
        }
        let mut children: Vec<NodeId> = self.rows.children(id).collect();
        sort_siblings(&mut children, &self.config.sorts, |&c, s| self.row_sort_key(c, s));
        for child in children {
            out.push(child);
            path.push(self.rows.node(child).value.clone());
            self.walk_rows(child, path, out);
            path.pop();
        }
    }

    fn walk_columns(&self, id: NodeId, path: &mut Vec<Scalar>, headers: bool, out: &mut Vec<(NodeId, bool)>) {
        let mut children: Vec<NodeId> = self.columns.children(id).collect();
        sort_siblings(&mut children, &self.config.column_sorts, |&c, s| self.column_sort_key(c, s));
        for child in children {
            path.push(self.columns.node(child).value.clone());
            let expanded = !self.columns.node(child).children.is_empty()
                && self.column_expansion.is_expanded(path);
            if !expanded || headers {
                out.push((child, expanded));
            }
            if expanded {
                self.walk_columns(child, path, headers, out);
            }
            path.pop();
        }
    }

    fn column_at(&self, column: usize) -> Option<(NodeId, bool, usize)> {
        let naggs = self.visible.len();
        if naggs == 0 {
            return None;
        }
        let &(node, header) = self.column_traversal.get(column / naggs)?;
        Some((node, header, self.visible[column % naggs]))
    }

    pub fn get_row_count(&self) -> usize {
        self.row_traversal.len()
    }

    pub fn unity_get_column_count(&self) -> usize {
        self.column_traversal.len() * self.visible.len()
    }

    pub fn unity_get_row_path(&self, row: usize) -> Vec<Scalar> {
        self.row_traversal
            .get(row)
            .map(|&id| self.rows.path_of(id))
            .unwrap_or_default()
    }

    /// Column pivot values followed by the aggregate name.
    pub fn unity_get_column_path(&self, column: usize) -> Vec<Scalar> {
        match self.column_at(column) {
            Some((node, _, agg)) => {
                let mut path = self.columns.path_of(node);
                path.push(Scalar::str(self.config.aggs[agg].name()));
                path
            }
            None => Vec::new(),
        }
    }

    /// Whether `column` belongs to an expanded (header) column node.
    pub fn column_is_header(&self, column: usize) -> bool {
        self.column_at(column).map_or(false, |(_, header, _)| header)
    }

    pub fn unity_get_row_depth(&self, row: usize) -> usize {
        self.row_traversal.get(row).map_or(0, |&id| self.rows.node(id).depth)
    }

    pub fn unity_get_row_expanded(&self, row: usize) -> bool {
        self.row_traversal.get(row).map_or(false, |&id| {
            !self.rows.node(id).children.is_empty() && self.row_expansion.is_expanded(&self.rows.path_of(id))
        })
    }

    pub fn get_data(&self, rows: Range<usize>, columns: Range<usize>) -> Vec<Scalar> {
        let rend = rows.end.min(self.row_traversal.len());
        let cend = columns.end.min(self.unity_get_column_count());
        let (rstart, cstart) = (rows.start.min(rend), columns.start.min(cend));
        let mut out = Vec::with_capacity((rend - rstart) * (cend - cstart));
        for &r in &self.row_traversal[rstart..rend] {
            for column in cstart..cend {
                out.push(match self.column_at(column) {
                    Some((c, _, agg)) => self.value(r, c, agg),
                    None => Scalar::Null,
                });
            }
        }
        out
    }

    /// Totals of every displayed column over all rows.
    pub fn column_totals(&self, columns: Range<usize>) -> Vec<Scalar> {
        self.get_data(0..1, columns)
    }

    fn axis_path(&self, axis: Axis, index: usize) -> Option<Vec<Scalar>> {
        match axis {
            Axis::Row => self.row_traversal.get(index).map(|&id| self.rows.path_of(id)),
            Axis::Column => self.column_at(index).map(|(id, _, _)| self.columns.path_of(id)),
        }
    }

    pub fn open(&mut self, axis: Axis, index: usize) -> bool {
        let Some(path) = self.axis_path(axis, index) else {
            return false;
        };
        let opened = match axis {
            Axis::Row => self.row_expansion.open(&path),
            Axis::Column => self.column_expansion.open(&path),
        };
        self.rebuild();
        opened
    }

    pub fn close(&mut self, axis: Axis, index: usize) -> bool {
        let Some(path) = self.axis_path(axis, index) else {
            return false;
        };
        let closed = match axis {
            Axis::Row => self.row_expansion.close(&path),
            Axis::Column => self.column_expansion.close(&path),
        };
        self.rebuild();
        closed
    }

    pub fn set_depth(&mut self, axis: Axis, depth: usize) {
        match axis {
            Axis::Row => self.row_expansion.set_depth(depth),
            Axis::Column => self.column_expansion.set_depth(depth),
        }
        self.rebuild();
    }

    /// Re-sorts rows. Returns true when the tree must be reloaded.
    pub fn sort_by(&mut self, sorts: &[SortSpec], schema: &Schema) -> Result<bool> {
        let mut view = self.view.clone();
        view.sorts = sorts.to_vec();
        self.apply_view(view, schema)
    }

    /// Re-sorts column siblings. Returns true when the tree must be reloaded.
    pub fn column_sort_by(&mut self, sorts: &[SortSpec], schema: &Schema) -> Result<bool> {
        let mut view = self.view.clone();
        view.column_sorts = sorts.to_vec();
        self.apply_view(view, schema)
    }

    fn apply_view(&mut self, view: ViewConfig, schema: &Schema) -> Result<bool> {
        let config = view.resolve(schema)?;
        let reload = config.aggs != self.config.aggs;
        self.view = view;
        if reload {
            self.reset(schema)?;
        } else {
            self.config = config;
            self.rebuild();
        }
        Ok(reload)
    }

    pub fn set_deltas_enabled(&mut self, enabled: bool) {
        self.deltas_enabled = enabled;
        if !enabled {
            self.step = StepDelta::default();
        }
    }

    pub fn get_step_delta(&self, rows: Range<usize>) -> StepDelta {
        self.step.window(rows)
    }

    pub fn get_row_delta(&self) -> RowDelta {
        RowDelta::from(&self.step)
    }

    pub fn reset(&mut self, schema: &Schema) -> Result<()> {
        self.config = self.view.resolve(schema)?;
        self.bindings = Bindings::new(&self.config, schema)?;
        self.visible = visible_aggs(&self.config);
        self.rows.clear(());
        self.columns.clear(());
        self.cells.clear();
        self.step = StepDelta::default();
        self.rebuild();
        Ok(())
    }
}

impl Grid for Ctx2 {
    fn grid_rows(&self) -> usize {
        self.get_row_count()
    }

    fn grid_columns(&self) -> usize {
        self.unity_get_column_count()
    }

    fn grid_row_path(&self, row: usize) -> Vec<Scalar> {
        self.unity_get_row_path(row)
    }

    fn grid_column_path(&self, column: usize) -> Vec<Scalar> {
        self.unity_get_column_path(column)
    }

    fn grid_data(&self, rows: Range<usize>, columns: Range<usize>) -> Vec<Scalar> {
        self.get_data(rows, columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use crate::config::AggSpec;
    use crate::sort::SortOrder;
    use crate::testing::{image, master, snapshot, Batch};
    use alloc::vec;

    fn f(v: f64) -> Scalar {
        Scalar::Float64(v)
    }

    fn loaded(config: ViewConfig) -> Ctx2 {
        let schema = master();
        let mut ctx = Ctx2::new(&config, &schema).unwrap();
        let rows = [
            image(1, "A", "x", 10.0),
            image(2, "A", "y", 5.0),
            image(3, "B", "x", 7.0),
        ];
        ctx.notify_initial(&snapshot(&schema, &rows)).unwrap();
        ctx
    }

    fn amount() -> ViewConfig {
        ViewConfig::new()
            .column("amount")
            .aggregate(AggSpec::new("amount", Aggregate::Sum))
    }

    #[test]
    fn test_cells() {
        let ctx = loaded(amount().row_pivot("region").column_pivot("category"));
        assert_eq!(ctx.get_row_count(), 3);
        assert_eq!(ctx.unity_get_column_count(), 2);
        assert_eq!(
            ctx.unity_get_column_path(1),
            vec![Scalar::str("B"), Scalar::str("amount")]
        );
        assert_eq!(
            ctx.get_data(0..3, 0..2),
            vec![f(15.0), f(7.0), f(10.0), f(7.0), f(5.0), Scalar::Null]
        );
    }

    #[test]
    fn test_column_only() {
        let config = amount().column_pivot("category");
        assert!(config.is_column_only());
        let mut ctx = loaded(config);
        // Total row plus one row per primary key.
        assert_eq!(ctx.get_row_count(), 4);
        assert_eq!(ctx.unity_get_row_path(1), vec![Scalar::Int32(1)]);
        assert_eq!(ctx.column_totals(0..2), vec![f(15.0), f(7.0)]);
        assert_eq!(ctx.get_data(3..4, 0..2), vec![Scalar::Null, f(7.0)]);

        let batch = Batch::new(&master()).row(Some(image(2, "A", "y", 5.0)), None);
        ctx.notify(&batch.tables()).unwrap();
        assert_eq!(ctx.get_row_count(), 3);
        assert_eq!(ctx.column_totals(0..2), vec![f(10.0), f(7.0)]);
    }

    #[test]
    fn test_emptied_column_disappears() {
        let mut ctx = loaded(amount().row_pivot("region").column_pivot("category"));
        let batch = Batch::new(&master()).row(Some(image(3, "B", "x", 7.0)), None);
        ctx.notify(&batch.tables()).unwrap();
        assert_eq!(ctx.unity_get_column_count(), 1);
        assert_eq!(ctx.get_data(0..1, 0..1), vec![f(15.0)]);
    }

    #[test]
    fn test_sorted_view_keeps_header_columns() {
        let base = amount()
            .row_pivot("region")
            .column_pivot("category")
            .column_pivot("region");
        assert_eq!(loaded(base.clone()).unity_get_column_count(), 3);

        let ctx = loaded(base.sort(SortSpec::new("amount", SortOrder::Desc)));
        assert_eq!(ctx.unity_get_column_count(), 5);
        assert!(ctx.column_is_header(0));
        assert!(!ctx.column_is_header(1));
        assert_eq!(
            ctx.unity_get_column_path(1),
            vec![Scalar::str("A"), Scalar::str("x"), Scalar::str("amount")]
        );
    }

    #[test]
    fn test_column_sort() {
        let schema = master();
        let mut ctx = loaded(
            amount()
                .row_pivot("region")
                .column_pivot("category")
                .column_sort(SortSpec::new("amount", SortOrder::Asc)),
        );
        assert_eq!(ctx.unity_get_column_path(0)[0], Scalar::str("B"));
        ctx.column_sort_by(&[SortSpec::new("amount", SortOrder::Desc)], &schema)
            .unwrap();
        assert_eq!(ctx.unity_get_column_path(0)[0], Scalar::str("A"));
    }

    #[test]
    fn test_step_delta_matches_full_grid_diff() {
        let mut ctx = loaded(amount().row_pivot("region").column_pivot("category"));
        ctx.set_deltas_enabled(true);
        // Column B empties, column C appears, one cell changes in place.
        let batch = Batch::new(&master())
            .row(Some(image(3, "B", "x", 7.0)), None)
            .row(None, Some(image(4, "C", "y", 1.0)))
            .row(Some(image(1, "A", "x", 10.0)), Some(image(1, "A", "x", 12.0)));
        let mut copy = ctx.clone();
        copy.set_deltas_enabled(false);
        let before = GridSnapshot::capture(&copy);
        copy.notify(&batch.tables()).unwrap();
        let expected = before.diff(&copy);

        ctx.notify(&batch.tables()).unwrap();
        let step = ctx.get_step_delta(0..usize::MAX);
        assert!(step.columns_changed);
        assert_eq!(step, expected);
        assert_eq!(ctx.get_row_delta(), RowDelta::from(&expected));
    }

    #[test]
    fn test_open_column() {
        let mut ctx = loaded(
            amount()
                .row_pivot("region")
                .column_pivot("category")
                .column_pivot("region")
                .column_depth(1),
        );
        assert_eq!(ctx.unity_get_column_count(), 2);
        assert!(ctx.open(Axis::Column, 0));
        assert_eq!(ctx.unity_get_column_count(), 3);
        ctx.set_depth(Axis::Column, 0);
        // Fully collapsed: each top-level column node is a leaf.
        assert_eq!(ctx.unity_get_column_count(), 2);
    }
}
