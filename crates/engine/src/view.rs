//! Views: stable, externally addressable coordinates over one context.
//!
//! A view holds a weak reference to its table's gnode and a generation
//! checked handle to its context. Dropping the table detaches every view;
//! dropping a view unregisters its context.
//!
//! Two projections separate view coordinates from context coordinates:
//!
//! - a column-only view pivots rows on the primary key under a synthetic
//!   total row, which is hidden, so view row `r` is context row `r + 1`
//! - a sorted two-sided context stores header columns inline; the view
//!   skips them

use crate::config::{EngineConfig, FaultPolicy};
use alloc::rc::Weak;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::ops::Range;
use rill_binary::{BatchEncoder, ColumnarBatch};
use rill_context::{Aggregate, Axis, CellUpdate, Context, ResolvedAgg, RowDelta, SortSpec, StepDelta, ViewConfig};
use rill_core::{DataType, Error, Result, Scalar};
use rill_incremental::{ContextHandle, Gnode};
use rill_storage::GState;

/// Name of the row path column emitted by `to_columns` for pivoted views.
pub const ROW_PATH: &str = "__ROW_PATH__";

/// A registered view over a table.
pub struct View {
    gnode: Weak<RefCell<Gnode>>,
    handle: ContextHandle,
    config: ViewConfig,
    separator: String,
    policy: FaultPolicy,
    deleted: bool,
}

/// Canonical type name of an aggregate's output.
fn aggregate_type_name(agg: &ResolvedAgg) -> &'static str {
    match agg.aggregate() {
        Aggregate::Count | Aggregate::DistinctCount => "integer",
        Aggregate::Mean
        | Aggregate::WeightedMean
        | Aggregate::PctSumParent
        | Aggregate::PctSumGrandTotal => "float",
        _ => agg.output_type().type_name(),
    }
}

fn row_offset(ctx: &Context) -> usize {
    if ctx.config().column_only {
        1
    } else {
        0
    }
}

/// Context column of every view column.
fn projection(ctx: &Context) -> Vec<usize> {
    (0..ctx.unity_get_column_count())
        .filter(|&c| !ctx.column_is_header(c))
        .collect()
}

fn join_path(path: &[Scalar], separator: &str) -> String {
    path.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Cells of view rows `rows` x view columns `columns`, row-major.
fn window(ctx: &Context, gstate: &GState, rows: Range<usize>, columns: Range<usize>) -> Result<Vec<Scalar>> {
    let offset = row_offset(ctx);
    let nrows = ctx.get_row_count().saturating_sub(offset);
    let rend = rows.end.min(nrows);
    let rstart = rows.start.min(rend);
    let ctx_rows = rstart + offset..rend + offset;

    let projected = projection(ctx);
    if projected.len() == ctx.unity_get_column_count() {
        return ctx.get_data(gstate, ctx_rows, columns);
    }

    let cend = columns.end.min(projected.len());
    let cstart = columns.start.min(cend);
    let width = ctx.unity_get_column_count();
    let full = ctx.get_data(gstate, ctx_rows, 0..width)?;
    let mut out = Vec::with_capacity((rend - rstart) * (cend - cstart));
    for row in full.chunks(width.max(1)) {
        out.extend(projected[cstart..cend].iter().map(|&c| row[c].clone()));
    }
    Ok(out)
}

impl View {
    pub(crate) fn new(
        gnode: Weak<RefCell<Gnode>>,
        handle: ContextHandle,
        config: ViewConfig,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            gnode,
            handle,
            config,
            separator: engine.separator.clone(),
            policy: engine.fault_policy,
            deleted: false,
        }
    }

    fn read<R>(&self, f: impl FnOnce(&Context, &GState) -> R) -> Result<R> {
        if self.deleted {
            return Err(Error::ViewDetached);
        }
        let rc = self.gnode.upgrade().ok_or(Error::ViewDetached)?;
        let gnode = rc.borrow();
        let context = gnode.context(self.handle)?;
        Ok(f(context, gnode.gstate()))
    }

    fn write<R>(&self, f: impl FnOnce(&mut Context, &GState) -> R) -> Result<R> {
        if self.deleted {
            return Err(Error::ViewDetached);
        }
        let rc = self.gnode.upgrade().ok_or(Error::ViewDetached)?;
        let mut gnode = rc.borrow_mut();
        let (context, gstate) = gnode.context_with_state(self.handle)?;
        Ok(f(context, gstate))
    }

    /// The configuration the view was created with.
    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Number of pivot axes: 0, 1 or 2.
    pub fn sides(&self) -> Result<usize> {
        self.read(|ctx, _| ctx.sides())
    }

    /// Column pivots without row pivots.
    pub fn is_column_only(&self) -> bool {
        self.config.is_column_only()
    }

    pub fn num_rows(&self) -> Result<usize> {
        self.read(|ctx, _| ctx.get_row_count().saturating_sub(row_offset(ctx)))
    }

    pub fn num_columns(&self) -> Result<usize> {
        self.read(|ctx, _| projection(ctx).len())
    }

    /// `name → canonical type name` of the view's output columns.
    ///
    /// Pivoted views report one entry per displayed aggregate, with counts
    /// as `"integer"` and means and percentages as `"float"`.
    pub fn schema(&self) -> Result<Vec<(String, &'static str)>> {
        self.read(|ctx, gstate| {
            let config = ctx.config();
            if ctx.sides() == 0 {
                config
                    .columns
                    .iter()
                    .map(|name| {
                        let dtype = gstate.schema().dtype_of(name)?;
                        Ok((name.clone(), dtype.type_name()))
                    })
                    .collect::<Result<Vec<_>>>()
            } else {
                Ok(config
                    .aggs
                    .iter()
                    .filter(|a| !a.hidden)
                    .map(|a| (a.name().to_string(), aggregate_type_name(a)))
                    .collect())
            }
        })?
    }

    /// Column names without pivot values.
    pub fn column_names(&self) -> Result<Vec<String>> {
        self.read(|ctx, _| ctx.column_names())
    }

    /// Full column paths: pivot values then the aggregate name, joined by
    /// the separator.
    pub fn column_paths(&self) -> Result<Vec<String>> {
        let separator = self.separator.as_str();
        self.read(|ctx, _| {
            projection(ctx)
                .into_iter()
                .map(|c| join_path(&ctx.unity_get_column_path(c), separator))
                .collect()
        })
    }

    /// Cells of `rows` x `columns`, row-major. Out-of-range bounds clamp.
    pub fn get_data(&self, rows: Range<usize>, columns: Range<usize>) -> Result<Vec<Scalar>> {
        let result = self.read(|ctx, gstate| window(ctx, gstate, rows, columns))?;
        self.policy.settle(result)
    }

    /// Pivot values of `row`; the primary key for flat views.
    pub fn get_row_path(&self, row: usize) -> Result<Vec<Scalar>> {
        self.read(|ctx, _| ctx.unity_get_row_path(row + row_offset(ctx)))
    }

    /// The grand total row of a pivoted view. Hidden from the rows of a
    /// column-only view; empty for flat views.
    pub fn totals(&self) -> Result<Vec<Scalar>> {
        let result = self.read(|ctx, gstate| {
            if ctx.sides() == 0 || ctx.get_row_count() == 0 {
                return Ok(Vec::new());
            }
            let width = ctx.unity_get_column_count();
            let row = ctx.get_data(gstate, 0..1, 0..width)?;
            Ok(projection(ctx).into_iter().map(|c| row[c].clone()).collect())
        })?;
        self.policy.settle(result)
    }

    pub fn get_row_expanded(&self, row: usize) -> Result<bool> {
        self.read(|ctx, _| ctx.unity_get_row_expanded(row + row_offset(ctx)))
    }

    /// Expands `row`. Returns false when the row cannot be expanded.
    pub fn expand(&self, row: usize) -> Result<bool> {
        self.write(|ctx, _| {
            let opened = ctx.open(Axis::Row, row + row_offset(ctx));
            if !opened {
                log::warn!("cannot expand row {}", row);
            }
            opened
        })
    }

    pub fn collapse(&self, row: usize) -> Result<bool> {
        self.write(|ctx, _| ctx.close(Axis::Row, row + row_offset(ctx)))
    }

    /// Expands view column `column` of a two-sided view.
    pub fn expand_column(&self, column: usize) -> Result<bool> {
        self.write(|ctx, _| match projection(ctx).get(column) {
            Some(&c) => ctx.open(Axis::Column, c),
            None => false,
        })
    }

    pub fn collapse_column(&self, column: usize) -> Result<bool> {
        self.write(|ctx, _| match projection(ctx).get(column) {
            Some(&c) => ctx.close(Axis::Column, c),
            None => false,
        })
    }

    /// Expands every row node above `depth`. Depths past the row pivots
    /// clamp.
    pub fn set_depth(&self, depth: usize) -> Result<()> {
        self.write(|ctx, _| {
            let max = ctx.config().row_pivots.len();
            if depth > max {
                log::warn!("row depth {} exceeds the {} row pivots", depth, max);
            }
            ctx.set_depth(Axis::Row, depth.min(max));
        })
    }

    pub fn set_column_depth(&self, depth: usize) -> Result<()> {
        self.write(|ctx, _| {
            let max = ctx.config().column_pivots.len();
            if depth > max {
                log::warn!("column depth {} exceeds the {} column pivots", depth, max);
            }
            ctx.set_depth(Axis::Column, depth.min(max));
        })
    }

    pub fn sort_by(&self, sorts: &[SortSpec]) -> Result<()> {
        let result = self.write(|ctx, gstate| ctx.sort_by(sorts, gstate))?;
        self.policy.settle(result)
    }

    pub fn column_sort_by(&self, sorts: &[SortSpec]) -> Result<()> {
        let result = self.write(|ctx, gstate| ctx.column_sort_by(sorts, gstate))?;
        self.policy.settle(result)
    }

    pub fn set_deltas_enabled(&self, enabled: bool) -> Result<()> {
        self.write(|ctx, _| ctx.set_deltas_enabled(enabled))
    }

    /// Cells changed by the last update within view rows `rows`, in view
    /// coordinates.
    pub fn get_step_delta(&self, rows: Range<usize>) -> Result<StepDelta> {
        self.read(|ctx, _| {
            let offset = row_offset(ctx);
            let step = ctx.get_step_delta(rows.start + offset..rows.end.saturating_add(offset));
            let projected = projection(ctx);
            let cells = step
                .cells
                .into_iter()
                .filter_map(|cell| {
                    let row = cell.row.checked_sub(offset)?;
                    let column = projected.iter().position(|&c| c == cell.column)?;
                    Some(CellUpdate { row, column, ..cell })
                })
                .collect();
            StepDelta {
                rows_changed: step.rows_changed,
                columns_changed: step.columns_changed,
                cells,
            }
        })
    }

    /// Rows changed by the last update, in view coordinates.
    pub fn get_row_delta(&self) -> Result<RowDelta> {
        self.read(|ctx, _| {
            let offset = row_offset(ctx);
            let delta = ctx.get_row_delta();
            RowDelta {
                rows_changed: delta.rows_changed,
                rows: delta.rows.iter().filter_map(|r| r.checked_sub(offset)).collect(),
            }
        })
    }

    /// Extracts view rows `rows` column by column. Pivoted views lead with
    /// a `__ROW_PATH__` column of joined row paths.
    pub fn to_columns(&self, rows: Range<usize>) -> Result<ColumnarBatch> {
        let separator = self.separator.as_str();
        let result = self.read(|ctx, gstate| {
            let config = ctx.config();
            let mut columns: Vec<(String, DataType)> = Vec::new();
            if ctx.sides() == 0 {
                for name in &config.columns {
                    columns.push((name.clone(), gstate.schema().dtype_of(name)?));
                }
            } else {
                columns.push((ROW_PATH.to_string(), DataType::String));
                for c in projection(ctx) {
                    let path = ctx.unity_get_column_path(c);
                    let dtype = path
                        .last()
                        .and_then(|name| name.as_str())
                        .and_then(|name| config.agg_index(name))
                        .map(|agg| config.aggs[agg].output_type())
                        .ok_or_else(|| Error::invalid_operation("column without an aggregate"))?;
                    columns.push((join_path(&path, separator), dtype));
                }
            }

            let offset = row_offset(ctx);
            let nrows = ctx.get_row_count().saturating_sub(offset);
            let rend = rows.end.min(nrows);
            let rstart = rows.start.min(rend);
            let data = window(ctx, gstate, rstart..rend, 0..usize::MAX)?;
            if ctx.sides() == 0 {
                return ColumnarBatch::from_row_major(&columns, &data);
            }

            let width = columns.len() - 1;
            let mut cells = Vec::with_capacity((rend - rstart) * columns.len());
            for (i, row) in (rstart..rend).enumerate() {
                let path = ctx.unity_get_row_path(row + offset);
                cells.push(Scalar::str(&join_path(&path, separator)));
                cells.extend_from_slice(&data[i * width..(i + 1) * width]);
            }
            ColumnarBatch::from_row_major(&columns, &cells)
        })?;
        self.policy.settle(result)
    }

    /// Encodes view rows `rows` in the columnar binary format, with the same
    /// columns as `to_columns`.
    pub fn to_bytes(&self, rows: Range<usize>) -> Result<Vec<u8>> {
        let batch = self.to_columns(rows)?;
        self.policy.settle(BatchEncoder::new().encode(&batch))
    }

    /// Unregisters the view's context.
    pub fn delete(mut self) -> Result<()> {
        self.unregister()
    }

    fn unregister(&mut self) -> Result<()> {
        if self.deleted {
            return Ok(());
        }
        self.deleted = true;
        let rc = self.gnode.upgrade().ok_or(Error::ViewDetached)?;
        let mut gnode = rc.try_borrow_mut().map_err(|_| Error::invalid_operation("table is busy"))?;
        gnode.unregister_context(self.handle)
    }
}

impl Drop for View {
    fn drop(&mut self) {
        // A detached view has nothing left to unregister.
        let _ = self.unregister();
    }
}
