//! The closed set of context variants behind one read/notify contract.

use crate::config::{ResolvedConfig, ViewConfig};
use crate::ctx0::Ctx0;
use crate::ctx1::Ctx1;
use crate::ctx2::Ctx2;
use crate::delta::{RowDelta, StepDelta};
use crate::notify::NotifyTables;
use crate::sort::SortSpec;
use alloc::string::String;
use alloc::vec::Vec;
use core::ops::Range;
use rill_core::{DataTable, Result, Scalar, Schema};
use rill_storage::GState;

/// Pivot axis addressed by expand/collapse operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Row,
    Column,
}

/// An aggregation context.
#[derive(Clone, Debug)]
pub enum Context {
    /// Flat, filtered and sorted rows.
    Zero(Ctx0),
    /// Row pivots.
    One(Ctx1),
    /// Row and column pivots.
    Two(Ctx2),
}

macro_rules! dispatch {
    ($self:expr, $ctx:ident => $body:expr) => {
        match $self {
            Context::Zero($ctx) => $body,
            Context::One($ctx) => $body,
            Context::Two($ctx) => $body,
        }
    };
}

impl Context {
    /// Creates the variant matching the number of pivot axes of `view`.
    pub fn new(view: &ViewConfig, schema: &Schema) -> Result<Self> {
        Ok(match view.sides() {
            0 => Context::Zero(Ctx0::new(view, schema)?),
            1 => Context::One(Ctx1::new(view, schema)?),
            _ => Context::Two(Ctx2::new(view, schema)?),
        })
    }

    pub fn sides(&self) -> usize {
        match self {
            Context::Zero(_) => 0,
            Context::One(_) => 1,
            Context::Two(_) => 2,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        dispatch!(self, ctx => ctx.config())
    }

    pub fn view_config(&self) -> &ViewConfig {
        dispatch!(self, ctx => ctx.view_config())
    }

    /// Applies one processed batch.
    pub fn notify(&mut self, tables: &NotifyTables<'_>) -> Result<()> {
        dispatch!(self, ctx => ctx.notify(tables))
    }

    /// Loads pre-existing rows from a master snapshot.
    pub fn notify_initial(&mut self, snapshot: &DataTable) -> Result<()> {
        dispatch!(self, ctx => ctx.notify_initial(snapshot))
    }

    pub fn get_row_count(&self) -> usize {
        dispatch!(self, ctx => ctx.get_row_count())
    }

    pub fn unity_get_column_count(&self) -> usize {
        dispatch!(self, ctx => ctx.unity_get_column_count())
    }

    pub fn unity_get_row_path(&self, row: usize) -> Vec<Scalar> {
        dispatch!(self, ctx => ctx.unity_get_row_path(row))
    }

    pub fn unity_get_column_path(&self, column: usize) -> Vec<Scalar> {
        dispatch!(self, ctx => ctx.unity_get_column_path(column))
    }

    pub fn unity_get_row_depth(&self, row: usize) -> usize {
        match self {
            Context::Zero(_) => 0,
            Context::One(ctx) => ctx.unity_get_row_depth(row),
            Context::Two(ctx) => ctx.unity_get_row_depth(row),
        }
    }

    pub fn unity_get_row_expanded(&self, row: usize) -> bool {
        match self {
            Context::Zero(_) => false,
            Context::One(ctx) => ctx.unity_get_row_expanded(row),
            Context::Two(ctx) => ctx.unity_get_row_expanded(row),
        }
    }

    /// Whether `column` is a header column of an expanded column node.
    pub fn column_is_header(&self, column: usize) -> bool {
        match self {
            Context::Two(ctx) => ctx.column_is_header(column),
            _ => false,
        }
    }

    /// Display names of the columns, without pivot values.
    pub fn column_names(&self) -> Vec<String> {
        let config = self.config();
        match self {
            Context::Zero(_) => config.columns.clone(),
            _ => config
                .aggs
                .iter()
                .filter(|a| !a.hidden)
                .map(|a| String::from(a.name()))
                .collect(),
        }
    }

    /// Cells of `rows` x `columns`, row-major. Out-of-range bounds clamp.
    pub fn get_data(&self, gstate: &GState, rows: Range<usize>, columns: Range<usize>) -> Result<Vec<Scalar>> {
        match self {
            Context::Zero(ctx) => ctx.get_data(gstate, rows, columns),
            Context::One(ctx) => Ok(ctx.get_data(rows, columns)),
            Context::Two(ctx) => Ok(ctx.get_data(rows, columns)),
        }
    }

    /// Expands row (or column) `index`. Returns false when nothing can open.
    pub fn open(&mut self, axis: Axis, index: usize) -> bool {
        match self {
            Context::Zero(_) => false,
            Context::One(ctx) => ctx.open(index),
            Context::Two(ctx) => ctx.open(axis, index),
        }
    }

    pub fn close(&mut self, axis: Axis, index: usize) -> bool {
        match self {
            Context::Zero(_) => false,
            Context::One(ctx) => ctx.close(index),
            Context::Two(ctx) => ctx.close(axis, index),
        }
    }

    pub fn set_depth(&mut self, axis: Axis, depth: usize) {
        match self {
            Context::Zero(_) => {}
            Context::One(ctx) => ctx.set_depth(depth),
            Context::Two(ctx) => ctx.set_depth(axis, depth),
        }
    }

    /// Re-sorts rows; reloads from `gstate` when the sort needs a new
    /// hidden aggregate.
    pub fn sort_by(&mut self, sorts: &[SortSpec], gstate: &GState) -> Result<()> {
        let reload = match self {
            Context::Zero(ctx) => return ctx.sort_by(sorts, gstate),
            Context::One(ctx) => ctx.sort_by(sorts, gstate.schema())?,
            Context::Two(ctx) => ctx.sort_by(sorts, gstate.schema())?,
        };
        if reload {
            self.notify_initial(&gstate.snapshot())?;
        }
        Ok(())
    }

    /// Re-sorts column siblings of a two-sided context.
    pub fn column_sort_by(&mut self, sorts: &[SortSpec], gstate: &GState) -> Result<()> {
        if let Context::Two(ctx) = self {
            if ctx.column_sort_by(sorts, gstate.schema())? {
                ctx.notify_initial(&gstate.snapshot())?;
            }
        }
        Ok(())
    }

    pub fn set_deltas_enabled(&mut self, enabled: bool) {
        dispatch!(self, ctx => ctx.set_deltas_enabled(enabled))
    }

    /// Cells changed by the last notification within `rows`.
    pub fn get_step_delta(&self, rows: Range<usize>) -> StepDelta {
        dispatch!(self, ctx => ctx.get_step_delta(rows))
    }

    pub fn get_row_delta(&self) -> RowDelta {
        dispatch!(self, ctx => ctx.get_row_delta())
    }

    /// Drops every row, re-resolving against `schema`.
    pub fn reset(&mut self, schema: &Schema) -> Result<()> {
        dispatch!(self, ctx => ctx.reset(schema))
    }

    /// Resets and reloads from the master state, e.g. after a column
    /// promotion or a new computed column.
    pub fn rebuild(&mut self, gstate: &GState) -> Result<()> {
        self.reset(gstate.schema())?;
        self.notify_initial(&gstate.snapshot())
    }
}
