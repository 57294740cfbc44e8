//! The notification contract between the diff engine and contexts.
//!
//! A processed batch is described by six row-aligned tables. `prev` and
//! `current` carry the master schema; their `psp_pkey` cell is valid exactly
//! when the row existed before (resp. after) the batch. `transitions` holds
//! one `ValueTransition` code per master column and `delta` the numeric
//! difference. Contexts read these tables only for the duration of
//! `notify`.

use crate::aggregate::{AggState, Aggregate};
use crate::config::ResolvedConfig;
use crate::filter::Filter;
use alloc::vec::Vec;
use rill_core::{DataTable, Result, Scalar, Schema, ValueTransition, PSP_PKEY};

/// Name of the single boolean column of the `existed` table.
pub const PSP_EXISTED: &str = "psp_existed";

/// The six tables produced by one processing step.
#[derive(Clone, Copy, Debug)]
pub struct NotifyTables<'a> {
    pub flattened: &'a DataTable,
    pub delta: &'a DataTable,
    pub prev: &'a DataTable,
    pub current: &'a DataTable,
    pub transitions: &'a DataTable,
    pub existed: &'a DataTable,
}

impl<'a> NotifyTables<'a> {
    pub fn num_rows(&self) -> usize {
        self.flattened.size()
    }

    /// Transition of master column `column` at `row`.
    pub fn transition(&self, column: usize, row: usize) -> ValueTransition {
        self.transitions
            .column_at(column)
            .values::<u8>()
            .and_then(|codes| codes.get(row).copied())
            .and_then(ValueTransition::from_u8)
            .unwrap_or(ValueTransition::Unchanged)
    }

    /// False only for a delete of a key that never materialized.
    pub fn existed(&self, row: usize) -> bool {
        self.existed
            .get_column(PSP_EXISTED)
            .map(|c| c.get_scalar(row).as_bool().unwrap_or(false))
            .unwrap_or(true)
    }
}

/// Master column indices used by one context.
#[derive(Clone, Debug)]
pub(crate) struct Bindings {
    pub pkey: usize,
    pub row_pivots: Vec<usize>,
    pub column_pivots: Vec<usize>,
    pub aggs: Vec<AggBinding>,
    pub filter: Vec<usize>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct AggBinding {
    pub value: usize,
    pub weight: Option<usize>,
    /// Whether a changed value can be applied as a delta.
    pub shiftable: bool,
}

impl Bindings {
    pub fn new(config: &ResolvedConfig, schema: &Schema) -> Result<Self> {
        let index = |name: &str| -> Result<usize> {
            schema
                .get_index(name)
                .ok_or_else(|| rill_core::Error::column_not_found(name))
        };
        let indices = |names: &[alloc::string::String]| -> Result<Vec<usize>> {
            names.iter().map(|n| index(n.as_str())).collect()
        };
        let aggs = config
            .aggs
            .iter()
            .map(|agg| {
                Ok(AggBinding {
                    value: index(agg.spec.column.as_str())?,
                    weight: agg.spec.weight.as_deref().map(index).transpose()?,
                    shiftable: matches!(
                        agg.aggregate(),
                        Aggregate::Sum
                            | Aggregate::Mean
                            | Aggregate::PctSumParent
                            | Aggregate::PctSumGrandTotal
                    ),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let filter = config
            .filter
            .terms
            .iter()
            .map(|t| index(t.column.as_str()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            pkey: index(PSP_PKEY)?,
            row_pivots: indices(&config.row_pivots)?,
            column_pivots: indices(&config.column_pivots)?,
            aggs,
            filter,
        })
    }
}

/// One row of a master-schema table.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Image<'a> {
    table: &'a DataTable,
    row: usize,
}

impl<'a> Image<'a> {
    pub fn new(table: &'a DataTable, row: usize) -> Self {
        Self { table, row }
    }

    #[inline]
    pub fn get(&self, column: usize) -> Scalar {
        self.table.column_at(column).get_scalar(self.row)
    }

    pub fn present(&self, bindings: &Bindings) -> bool {
        self.table.column_at(bindings.pkey).is_valid(self.row)
    }

    pub fn pkey(&self, bindings: &Bindings) -> Scalar {
        self.get(bindings.pkey)
    }

    pub fn passes(&self, filter: &Filter, bindings: &Bindings) -> bool {
        filter.matches(|i| self.get(bindings.filter[i]))
    }

    pub fn path(&self, columns: &[usize]) -> Vec<Scalar> {
        columns.iter().map(|&c| self.get(c)).collect()
    }
}

/// How one notified row affects a context.
#[derive(Clone, Copy, Debug)]
pub(crate) enum RowChange<'a> {
    None,
    Add(Image<'a>),
    Remove(Image<'a>),
    /// Left one path for another.
    Move { prev: Image<'a>, cur: Image<'a> },
    /// Stayed on the same path; only aggregate inputs may have changed.
    InPlace { prev: Image<'a>, cur: Image<'a> },
}

pub(crate) fn classify_row<'a>(
    tables: &NotifyTables<'a>,
    bindings: &Bindings,
    filter: &Filter,
    row: usize,
) -> RowChange<'a> {
    if !tables.existed(row) {
        return RowChange::None;
    }
    let prev = Image::new(tables.prev, row);
    let cur = Image::new(tables.current, row);
    let was_in = prev.present(bindings) && prev.passes(filter, bindings);
    let is_in = cur.present(bindings) && cur.passes(filter, bindings);
    match (was_in, is_in) {
        (false, false) => RowChange::None,
        (false, true) => RowChange::Add(cur),
        (true, false) => RowChange::Remove(prev),
        (true, true) => {
            let same = prev.path(&bindings.row_pivots) == cur.path(&bindings.row_pivots)
                && prev.path(&bindings.column_pivots) == cur.path(&bindings.column_pivots);
            if same {
                RowChange::InPlace { prev, cur }
            } else {
                RowChange::Move { prev, cur }
            }
        }
    }
}

/// Aggregate inputs of one row image.
#[derive(Clone, Debug)]
pub(crate) struct Contribution {
    values: Vec<Scalar>,
    weights: Vec<Scalar>,
}

impl Contribution {
    pub fn of(image: &Image<'_>, bindings: &Bindings) -> Self {
        Self {
            values: bindings.aggs.iter().map(|a| image.get(a.value)).collect(),
            weights: bindings
                .aggs
                .iter()
                .map(|a| a.weight.map_or(Scalar::Null, |w| image.get(w)))
                .collect(),
        }
    }

    pub fn add_to(&self, states: &mut [AggState]) {
        for ((state, value), weight) in states.iter_mut().zip(&self.values).zip(&self.weights) {
            state.add(value, weight);
        }
    }

    pub fn retract_from(&self, states: &mut [AggState]) {
        for ((state, value), weight) in states.iter_mut().zip(&self.values).zip(&self.weights) {
            state.retract(value, weight);
        }
    }
}

/// Per-aggregate action for a row that stayed on its path.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum AggChange {
    Skip,
    /// Carries the row's delta cell; an invalid (overflowed) delta swaps.
    Shift(Scalar),
    Swap,
}

pub(crate) fn in_place_changes(tables: &NotifyTables<'_>, bindings: &Bindings, row: usize) -> Vec<AggChange> {
    bindings
        .aggs
        .iter()
        .map(|agg| {
            let value = tables.transition(agg.value, row);
            let weight = agg
                .weight
                .map_or(ValueTransition::Unchanged, |w| tables.transition(w, row));
            if value.is_noop() && weight.is_noop() {
                return AggChange::Skip;
            }
            if agg.shiftable && agg.weight.is_none() && value == ValueTransition::Changed {
                let delta = tables.delta.column_at(agg.value).get_scalar(row);
                if !delta.is_null() {
                    return AggChange::Shift(delta);
                }
            }
            AggChange::Swap
        })
        .collect()
}

pub(crate) fn apply_in_place(
    states: &mut [AggState],
    changes: &[AggChange],
    prev: &Contribution,
    cur: &Contribution,
) {
    for (i, (state, change)) in states.iter_mut().zip(changes).enumerate() {
        match change {
            AggChange::Skip => {}
            AggChange::Shift(delta) if state.shift(delta) => {}
            _ => {
                state.retract(&prev.values[i], &prev.weights[i]);
                state.add(&cur.values[i], &cur.weights[i]);
            }
        }
    }
}
