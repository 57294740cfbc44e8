//! One-sided context: a sparse tree keyed by row-pivot path.
//!
//! Row 0 of the traversal is the root, i.e. the grand total. Every node
//! carries one running `AggState` per aggregate; a notified row updates the
//! states of its leaf and of every ancestor.

use crate::aggregate::{percent_of, AggState, Aggregate};
use crate::config::{ResolvedAgg, ResolvedConfig, ViewConfig};
use crate::delta::{Grid, GridSnapshot, RowDelta, StepDelta, TouchLog};
use crate::expand::Expansion;
use crate::notify::{
    apply_in_place, classify_row, in_place_changes, AggChange, Bindings, Contribution, Image,
    NotifyTables, RowChange,
};
use crate::sort::{sort_siblings, SortSpec};
use crate::tree::{NodeId, SparseTree, ROOT};
use alloc::vec::Vec;
use core::ops::Range;
use rill_core::{DataTable, Result, Scalar, Schema};

fn fresh_states(aggs: &[ResolvedAgg]) -> Vec<AggState> {
    aggs.iter().map(|a| AggState::new(a.aggregate())).collect()
}

#[derive(Clone, Debug)]
pub struct Ctx1 {
    view: ViewConfig,
    config: ResolvedConfig,
    bindings: Bindings,
    tree: SparseTree<Vec<AggState>>,
    expansion: Expansion,
    traversal: Vec<NodeId>,
    /// Indices of the displayed (non-hidden) aggregates.
    visible: Vec<usize>,
    deltas_enabled: bool,
    step: StepDelta,
}

impl Ctx1 {
    pub fn new(view: &ViewConfig, schema: &Schema) -> Result<Self> {
        let config = view.resolve(schema)?;
        let bindings = Bindings::new(&config, schema)?;
        let expansion = Expansion::new(config.row_depth, config.row_pivots.len());
        let mut ctx = Self {
            view: view.clone(),
            tree: SparseTree::new(fresh_states(&config.aggs)),
            visible: visible_aggs(&config),
            config,
            bindings,
            expansion,
            traversal: Vec::new(),
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
        let path = image.path(&self.bindings.row_pivots);
        if let Some(touched) = touched {
            self.log_path(touched, &path);
        }
        let aggs = &self.config.aggs;
        let ids = self.tree.path_ids(&path, || fresh_states(aggs));
        self.tree.adjust_counts(&ids, true);
        let contribution = Contribution::of(image, &self.bindings);
        for &id in &ids {
            contribution.add_to(&mut self.tree.node_mut(id).payload);
        }
    }

    fn remove(&mut self, image: &Image<'_>, mut touched: Option<&mut TouchLog>) {
        let path = image.path(&self.bindings.row_pivots);
        let Some(leaf) = self.tree.find(&path) else {
            log::warn!("retracting a row from a missing pivot path");
            return;
        };
        if let Some(touched) = touched.as_deref_mut() {
            self.log_path(touched, &path);
        }
        let ids = self.tree.ancestors(leaf);
        let contribution = Contribution::of(image, &self.bindings);
        for &id in &ids {
            contribution.retract_from(&mut self.tree.node_mut(id).payload);
        }
        self.tree.adjust_counts(&ids, false);
        if self.tree.prune(&ids) > 0 {
            if let Some(touched) = touched {
                for &id in ids.iter().filter(|&&id| self.tree.get(id).is_none()) {
                    touched.forget_row(id);
                }
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
        let path = cur.path(&self.bindings.row_pivots);
        let Some(leaf) = self.tree.find(&path) else {
            return;
        };
        if let Some(touched) = touched {
            self.log_path(touched, &path);
        }
        let (prev, cur) = (
            Contribution::of(prev, &self.bindings),
            Contribution::of(cur, &self.bindings),
        );
        for id in self.tree.ancestors(leaf) {
            apply_in_place(&mut self.tree.node_mut(id).payload, &changes, &prev, &cur);
        }
    }

    /// Logs every prefix of `path`, root included, before it changes.
    fn log_path(&self, touched: &mut TouchLog, path: &[Scalar]) {
        for (depth, id) in self.tree.prefix_ids(path).into_iter().enumerate() {
            touched.touch(&path[..depth], &[], id.map(|id| (id, ROOT)), |r, _| self.visible_values(r));
        }
    }

    fn visible_values(&self, id: NodeId) -> Vec<Scalar> {
        self.visible.iter().map(|&agg| self.value(id, agg)).collect()
    }

    /// Percentages read nodes a batch never touches, so those views diff
    /// the whole grid.
    fn logs_touched_cells(&self) -> bool {
        !self.visible.iter().any(|&agg| self.config.aggs[agg].aggregate().is_relative())
    }

    pub fn notify(&mut self, tables: &NotifyTables<'_>) -> Result<()> {
        let snapshot = (self.deltas_enabled && !self.logs_touched_cells())
            .then(|| GridSnapshot::capture(&*self));
        let mut touched = (self.deltas_enabled && snapshot.is_none())
            .then(|| TouchLog::new(&self.traversal, &[ROOT]));
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
                &self.traversal,
                &[ROOT],
                |row, _| self.tree.find(row).map(|id| (id, ROOT)),
                |r, _| self.visible_values(r),
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

    /// Value of aggregate `agg` at node `id`.
    fn value(&self, id: NodeId, agg: usize) -> Scalar {
        let spec = &self.config.aggs[agg];
        let node = self.tree.node(id);
        let state = &node.payload[agg];
        match spec.aggregate() {
            Aggregate::PctSumParent => {
                let parent = node.parent.unwrap_or(id);
                percent_of(state.sum(), self.tree.node(parent).payload[agg].sum())
            }
            Aggregate::PctSumGrandTotal => {
                percent_of(state.sum(), self.tree.node(ROOT).payload[agg].sum())
            }
            other => state.value(other, spec.input_type),
        }
    }

    fn sort_key(&self, id: NodeId, sort: &SortSpec) -> Scalar {
        let node = self.tree.node(id);
        if node.depth > 0 && self.config.row_pivots.get(node.depth - 1) == Some(&sort.column) {
            return node.value.clone();
        }
        match self.config.agg_index(&sort.column) {
            Some(agg) => self.value(id, agg),
            None => Scalar::Null,
        }
    }

    /// Recomputes the visible row order.
    fn rebuild(&mut self) {
        let mut out = alloc::vec![ROOT];
        let mut path = Vec::new();
        self.walk(ROOT, &mut path, &mut out);
        self.traversal = out;
    }

    fn walk(&self, id: NodeId, path: &mut Vec<Scalar>, out: &mut Vec<NodeId>) {
        if !self.expansion.is_expanded(path) {
            return;
        }
        let mut children: Vec<NodeId> = self.tree.children(id).collect();
        sort_siblings(&mut children, &self.config.sorts, |&c, s| self.sort_key(c, s));
        for child in children {
            out.push(child);
            path.push(self.tree.node(child).value.clone());
            self.walk(child, path, out);
            path.pop();
        }
    }

    pub fn get_row_count(&self) -> usize {
        self.traversal.len()
    }

    pub fn unity_get_column_count(&self) -> usize {
        self.visible.len()
    }

    pub fn unity_get_row_path(&self, row: usize) -> Vec<Scalar> {
        self.traversal
            .get(row)
            .map(|&id| self.tree.path_of(id))
            .unwrap_or_default()
    }

    pub fn unity_get_column_path(&self, column: usize) -> Vec<Scalar> {
        self.visible
            .get(column)
            .map(|&agg| alloc::vec![Scalar::str(self.config.aggs[agg].name())])
            .unwrap_or_default()
    }

    pub fn unity_get_row_depth(&self, row: usize) -> usize {
        self.traversal.get(row).map_or(0, |&id| self.tree.node(id).depth)
    }

    pub fn unity_get_row_expanded(&self, row: usize) -> bool {
        self.traversal.get(row).map_or(false, |&id| {
            !self.tree.node(id).children.is_empty() && self.expansion.is_expanded(&self.tree.path_of(id))
        })
    }

    pub fn get_data(&self, rows: Range<usize>, columns: Range<usize>) -> Vec<Scalar> {
        let rend = rows.end.min(self.traversal.len());
        let cend = columns.end.min(self.visible.len());
        let (rstart, cstart) = (rows.start.min(rend), columns.start.min(cend));
        let mut out = Vec::with_capacity((rend - rstart) * (cend - cstart));
        for &id in &self.traversal[rstart..rend] {
            for &agg in &self.visible[cstart..cend] {
                out.push(self.value(id, agg));
            }
        }
        out
    }

    pub fn open(&mut self, row: usize) -> bool {
        let Some(&id) = self.traversal.get(row) else {
            return false;
        };
        let opened = self.expansion.open(&self.tree.path_of(id));
        self.rebuild();
        opened
    }

    pub fn close(&mut self, row: usize) -> bool {
        let Some(&id) = self.traversal.get(row) else {
            return false;
        };
        let closed = self.expansion.close(&self.tree.path_of(id));
        self.rebuild();
        closed
    }

    pub fn set_depth(&mut self, depth: usize) {
        self.expansion.set_depth(depth);
        self.rebuild();
    }

    /// Re-sorts siblings. Returns true when the aggregate set changed and
    /// the tree must be reloaded.
    pub fn sort_by(&mut self, sorts: &[SortSpec], schema: &Schema) -> Result<bool> {
        let mut view = self.view.clone();
        view.sorts = sorts.to_vec();
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

    /// Re-resolves against `schema` and drops every node. Expansion state
    /// is kept.
    pub fn reset(&mut self, schema: &Schema) -> Result<()> {
        self.config = self.view.resolve(schema)?;
        self.bindings = Bindings::new(&self.config, schema)?;
        self.visible = visible_aggs(&self.config);
        self.tree.clear(fresh_states(&self.config.aggs));
        self.step = StepDelta::default();
        self.rebuild();
        Ok(())
    }
}

pub(crate) fn visible_aggs(config: &ResolvedConfig) -> Vec<usize> {
    config
        .aggs
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.hidden)
        .map(|(i, _)| i)
        .collect()
}

impl Grid for Ctx1 {
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
