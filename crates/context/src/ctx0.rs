//! Flat context: a filtered, sorted list of primary keys.
//!
//! Row data is not copied; `get_data` reads the master state by slot.

use crate::config::{ResolvedConfig, ViewConfig};
use crate::delta::{CellUpdate, RowDelta, StepDelta};
use crate::notify::{classify_row, Bindings, Image, NotifyTables, RowChange};
use crate::sort::{compare_keys, SortOrder, SortSpec};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::ops::Range;
use hashbrown::HashMap;
use rill_core::{DataTable, Result, Scalar, Schema};
use rill_storage::GState;

#[derive(Clone, Debug)]
pub struct Ctx0 {
    view: ViewConfig,
    config: ResolvedConfig,
    bindings: Bindings,
    /// Master indices of the sort columns.
    sort_columns: Vec<usize>,
    orders: Vec<SortOrder>,
    /// Master indices of the visible columns.
    columns: Vec<usize>,
    /// `(sort keys, pkey)` in display order.
    order: Vec<(Vec<Scalar>, Scalar)>,
    members: HashMap<Scalar, Vec<Scalar>>,
    deltas_enabled: bool,
    step: StepDelta,
}

impl Ctx0 {
    pub fn new(view: &ViewConfig, schema: &Schema) -> Result<Self> {
        let config = view.resolve(schema)?;
        let bindings = Bindings::new(&config, schema)?;
        let mut ctx = Self {
            view: view.clone(),
            config,
            bindings,
            sort_columns: Vec::new(),
            orders: Vec::new(),
            columns: Vec::new(),
            order: Vec::new(),
            members: HashMap::new(),
            deltas_enabled: false,
            step: StepDelta::default(),
        };
        ctx.bind(schema)?;
        Ok(ctx)
    }

    fn bind(&mut self, schema: &Schema) -> Result<()> {
        self.columns = self
            .config
            .columns
            .iter()
            .map(|c| schema.get_index(c).ok_or_else(|| rill_core::Error::column_not_found(c.as_str())))
            .collect::<Result<_>>()?;
        self.sort_columns = self
            .config
            .sorts
            .iter()
            .map(|s| schema.get_index(&s.column).ok_or_else(|| rill_core::Error::column_not_found(s.column.as_str())))
            .collect::<Result<_>>()?;
        self.orders = self.config.sorts.iter().map(|s| s.order).collect();
        Ok(())
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn view_config(&self) -> &ViewConfig {
        &self.view
    }

    fn compare(&self, a: &(Vec<Scalar>, Scalar), b: &(Vec<Scalar>, Scalar)) -> Ordering {
        compare_keys(&self.orders, &a.0, &b.0).then_with(|| a.1.cmp(&b.1))
    }

    fn position(&self, entry: &(Vec<Scalar>, Scalar)) -> core::result::Result<usize, usize> {
        self.order.binary_search_by(|probe| self.compare(probe, entry))
    }

    fn insert(&mut self, pkey: Scalar, keys: Vec<Scalar>) {
        let entry = (keys.clone(), pkey.clone());
        let at = match self.position(&entry) {
            Ok(at) | Err(at) => at,
        };
        self.order.insert(at, entry);
        self.members.insert(pkey, keys);
    }

    fn remove(&mut self, pkey: &Scalar) -> bool {
        let Some(keys) = self.members.remove(pkey) else {
            return false;
        };
        if let Ok(at) = self.position(&(keys, pkey.clone())) {
            self.order.remove(at);
        }
        true
    }

    fn keys_of(&self, image: &Image<'_>) -> Vec<Scalar> {
        image.path(&self.sort_columns)
    }

    pub fn notify(&mut self, tables: &NotifyTables<'_>) -> Result<()> {
        let mut rows_changed = false;
        let mut touched: Vec<(Scalar, Vec<(usize, Scalar, Scalar)>)> = Vec::new();
        for row in 0..tables.num_rows() {
            match classify_row(tables, &self.bindings, &self.config.filter, row) {
                RowChange::None => {}
                RowChange::Add(cur) => {
                    let pkey = cur.pkey(&self.bindings);
                    let keys = self.keys_of(&cur);
                    self.insert(pkey.clone(), keys);
                    rows_changed = true;
                    if self.deltas_enabled {
                        let cells = self.columns.iter().enumerate().map(|(i, &c)| (i, Scalar::Null, cur.get(c))).collect();
                        touched.push((pkey, cells));
                    }
                }
                RowChange::Remove(prev) => {
                    rows_changed |= self.remove(&prev.pkey(&self.bindings));
                }
                RowChange::Move { prev, cur } | RowChange::InPlace { prev, cur } => {
                    let pkey = cur.pkey(&self.bindings);
                    let keys = self.keys_of(&cur);
                    if self.members.get(&pkey) != Some(&keys) {
                        self.remove(&prev.pkey(&self.bindings));
                        self.insert(pkey.clone(), keys);
                        rows_changed |= !self.orders.iter().all(|o| *o == SortOrder::None);
                    }
                    if self.deltas_enabled {
                        let cells = self
                            .columns
                            .iter()
                            .enumerate()
                            .filter(|&(_, &c)| !tables.transition(c, row).is_noop())
                            .map(|(i, &c)| (i, prev.get(c), cur.get(c)))
                            .collect();
                        touched.push((pkey, cells));
                    }
                }
            }
        }

        if self.deltas_enabled {
            let mut cells = Vec::new();
            for (pkey, updates) in touched {
                let Some(keys) = self.members.get(&pkey) else {
                    continue;
                };
                let Ok(row) = self.position(&(keys.clone(), pkey.clone())) else {
                    continue;
                };
                cells.extend(updates.into_iter().map(|(column, old_value, new_value)| CellUpdate {
                    row,
                    column,
                    old_value,
                    new_value,
                }));
            }
            self.step = StepDelta {
                rows_changed,
                columns_changed: false,
                cells,
            };
        }
        Ok(())
    }

    /// Loads every row of a master snapshot.
    pub fn notify_initial(&mut self, snapshot: &DataTable) -> Result<()> {
        for row in 0..snapshot.size() {
            let image = Image::new(snapshot, row);
            if image.present(&self.bindings) && image.passes(&self.config.filter, &self.bindings) {
                let keys = self.keys_of(&image);
                self.insert(image.pkey(&self.bindings), keys);
            }
        }
        Ok(())
    }

    pub fn get_row_count(&self) -> usize {
        self.order.len()
    }

    pub fn unity_get_column_count(&self) -> usize {
        self.columns.len()
    }

    /// The primary key of row `row`.
    pub fn unity_get_row_path(&self, row: usize) -> Vec<Scalar> {
        self.order
            .get(row)
            .map(|(_, pkey)| alloc::vec![pkey.clone()])
            .unwrap_or_default()
    }

    pub fn unity_get_column_path(&self, column: usize) -> Vec<Scalar> {
        self.config
            .columns
            .get(column)
            .map(|name| alloc::vec![Scalar::str(name)])
            .unwrap_or_default()
    }

    pub fn get_pkeys(&self, rows: Range<usize>) -> Vec<Scalar> {
        let end = rows.end.min(self.order.len());
        let start = rows.start.min(end);
        self.order[start..end].iter().map(|(_, pkey)| pkey.clone()).collect()
    }

    /// Cells of `rows` x `columns`, row-major, read from `gstate`.
    pub fn get_data(&self, gstate: &GState, rows: Range<usize>, columns: Range<usize>) -> Result<Vec<Scalar>> {
        let cend = columns.end.min(self.columns.len());
        let cstart = columns.start.min(cend);
        let master = gstate.master();
        let mut out = Vec::new();
        for pkey in self.get_pkeys(rows) {
            let slot = gstate.slot_of(&pkey);
            for &c in &self.columns[cstart..cend] {
                out.push(match slot {
                    Some(slot) => master.column_at(c).get_scalar(slot),
                    None => Scalar::Null,
                });
            }
        }
        Ok(out)
    }

    /// Re-sorts the rows, reading sort keys from the master state.
    pub fn sort_by(&mut self, sorts: &[SortSpec], gstate: &GState) -> Result<()> {
        let mut view = self.view.clone();
        view.sorts = sorts.to_vec();
        let schema = gstate.schema();
        self.config = view.resolve(schema)?;
        self.view = view;
        self.bindings = Bindings::new(&self.config, schema)?;
        self.bind(schema)?;

        let master = gstate.master();
        let pkeys: Vec<Scalar> = self.order.drain(..).map(|(_, pkey)| pkey).collect();
        self.members.clear();
        for pkey in pkeys {
            if let Some(slot) = gstate.slot_of(&pkey) {
                let keys = Image::new(master, slot).path(&self.sort_columns);
                self.insert(pkey, keys);
            }
        }
        Ok(())
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

    /// Re-resolves against a new schema and drops every row.
    pub fn reset(&mut self, schema: &Schema) -> Result<()> {
        self.config = self.view.resolve(schema)?;
        self.bindings = Bindings::new(&self.config, schema)?;
        self.bind(schema)?;
        self.order.clear();
        self.members.clear();
        self.step = StepDelta::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterOp, FilterTerm};
    use crate::testing::{image, master, snapshot, Batch};
    use alloc::vec;
    use rill_core::PSP_PKEY;

    fn gstate(rows: &[Vec<Scalar>]) -> GState {
        let schema = master();
        let mut gs = GState::new(&schema, rill_core::DataType::Int32).unwrap();
        let table = snapshot(&schema, rows);
        for (r, values) in rows.iter().enumerate() {
            gs.upsert(&values[3], &table, r).unwrap();
        }
        gs
    }

    fn rows() -> Vec<Vec<Scalar>> {
        vec![
            image(1, "A", "x", 10.0),
            image(2, "A", "y", 5.0),
            image(3, "B", "x", 7.0),
        ]
    }

    #[test]
    fn test_sorted_rows() {
        let schema = master();
        let gs = gstate(&rows());
        let config = ViewConfig::new()
            .column("category")
            .column("amount")
            .sort(SortSpec::new("amount", SortOrder::Desc));
        let mut ctx = Ctx0::new(&config, &schema).unwrap();
        ctx.notify_initial(&gs.snapshot()).unwrap();

        assert_eq!(ctx.get_row_count(), 3);
        assert_eq!(ctx.unity_get_column_count(), 2);
        assert_eq!(
            ctx.get_pkeys(0..3),
            vec![Scalar::Int32(1), Scalar::Int32(3), Scalar::Int32(2)]
        );
        assert_eq!(
            ctx.get_data(&gs, 1..2, 0..2).unwrap(),
            vec![Scalar::str("B"), Scalar::Float64(7.0)]
        );

        ctx.sort_by(&[SortSpec::new("amount", SortOrder::Asc)], &gs)
            .unwrap();
        assert_eq!(ctx.unity_get_row_path(0), vec![Scalar::Int32(2)]);
    }

    #[test]
    fn test_unsorted_rows_follow_pkey_order() {
        let schema = master();
        let gs = gstate(&rows());
        let mut ctx = Ctx0::new(&ViewConfig::new(), &schema).unwrap();
        ctx.notify_initial(&gs.snapshot()).unwrap();
        assert_eq!(ctx.unity_get_column_count(), 3);
        assert_eq!(ctx.unity_get_column_path(2), vec![Scalar::str("amount")]);
        assert_eq!(ctx.get_pkeys(0..10).len(), 3);
        assert!(!ctx.config().columns.iter().any(|c| c == PSP_PKEY));
    }

    #[test]
    fn test_filter_tracks_updates() {
        let schema = master();
        let config = ViewConfig::new().filter(FilterTerm::new(
            "category",
            FilterOp::Eq,
            Scalar::str("A"),
        ));
        let mut ctx = Ctx0::new(&config, &schema).unwrap();
        ctx.set_deltas_enabled(true);
        ctx.notify_initial(&snapshot(&schema, &rows())).unwrap();
        assert_eq!(ctx.get_row_count(), 2);

        // 3 moves into the filter, 1 moves out, 2 changes in place.
        let batch = Batch::new(&schema)
            .row(Some(image(3, "B", "x", 7.0)), Some(image(3, "A", "x", 7.0)))
            .row(Some(image(1, "A", "x", 10.0)), Some(image(1, "B", "x", 10.0)))
            .row(Some(image(2, "A", "y", 5.0)), Some(image(2, "A", "y", 6.0)));
        ctx.notify(&batch.tables()).unwrap();
        assert_eq!(ctx.get_pkeys(0..3), vec![Scalar::Int32(2), Scalar::Int32(3)]);

        let step = ctx.get_step_delta(0..2);
        assert!(step.rows_changed);
        let amount = step
            .cells
            .iter()
            .find(|c| c.row == 0 && c.column == 2)
            .unwrap();
        assert_eq!(amount.old_value, Scalar::Float64(5.0));
        assert_eq!(amount.new_value, Scalar::Float64(6.0));

        let batch = Batch::new(&schema).row(Some(image(2, "A", "y", 6.0)), None);
        ctx.notify(&batch.tables()).unwrap();
        assert_eq!(ctx.get_pkeys(0..3), vec![Scalar::Int32(3)]);
    }
}
