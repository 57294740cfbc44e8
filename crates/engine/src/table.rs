//! The table façade: typed ingestion in front of one gnode.
//!
//! Rows are written in declared column order and turned into input
//! fragments carrying `psp_pkey` and `psp_op`. A value that does not fit its
//! column promotes the column first: integers widen to `float64`, anything
//! else becomes `string`.

use crate::config::EngineConfig;
use crate::view::View;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use rill_context::ViewConfig;
use rill_core::{DataTable, DataType, Error, OpCode, Result, Scalar, Schema, PSP_OP, PSP_PKEY};
use rill_incremental::{ComputedColumn, Gnode, ProcessResult};
use rill_storage::PortRole;

/// A primary-key addressed table with incrementally maintained views.
pub struct Table {
    gnode: Rc<RefCell<Gnode>>,
    index: Option<String>,
    config: EngineConfig,
    /// Rows ingested by an index-less table; the next row's key.
    offset: usize,
    next_view: usize,
}

impl Table {
    /// Creates a table over `schema`. Rows are keyed by `index` when given,
    /// else by their ingestion offset (modulo `config.limit`).
    pub fn new(schema: &Schema, index: Option<&str>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let schema = schema.without_internal();
        if schema.is_empty() {
            return Err(Error::invalid_config("a table needs at least one column"));
        }
        let pkey_dtype = match index {
            Some(name) => schema.dtype_of(name)?,
            None => DataType::Int64,
        };
        let input = schema.to_input_schema(pkey_dtype)?;
        let mut gnode = Gnode::new(input, schema, config.gnode)?;
        gnode.init()?;
        log::debug!(
            "created table with {} columns, index {:?}",
            gnode.output_schema().len(),
            index
        );
        Ok(Self {
            gnode: Rc::new(RefCell::new(gnode)),
            index: index.map(|s| s.to_string()),
            config,
            offset: 0,
            next_view: 0,
        })
    }

    /// Writes rows given in declared column order. Short rows leave the
    /// remaining columns unwritten; existing rows keep their stored values
    /// there.
    pub fn update(&mut self, rows: &[Vec<Scalar>]) -> Result<ProcessResult> {
        self.ingest(rows, OpCode::Insert)
    }

    /// Writes a columnar batch. Columns are matched by name; columns the
    /// batch lacks are left unwritten.
    pub fn update_columns(&mut self, batch: &DataTable) -> Result<ProcessResult> {
        let declared = self.declared_columns();
        let mut sources = Vec::with_capacity(declared.len());
        for name in &declared {
            sources.push(batch.get_column(name).ok());
        }
        for (name, _) in batch.schema().iter() {
            if !declared.iter().any(|d| d == name) {
                return Err(Error::column_not_found(name));
            }
        }
        let rows: Vec<Vec<Scalar>> = (0..batch.size())
            .map(|row| {
                sources
                    .iter()
                    .map(|src| src.map_or(Scalar::Null, |c| c.get_scalar(row)))
                    .collect()
            })
            .collect();
        self.ingest(&rows, OpCode::Insert)
    }

    /// Deletes the rows with the given primary keys.
    pub fn remove(&mut self, keys: &[Scalar]) -> Result<ProcessResult> {
        let mut fragment = DataTable::with_len(self.gnode.borrow().input_schema(), keys.len());
        for (row, key) in keys.iter().enumerate() {
            fragment.set_scalar(PSP_PKEY, row, key).map_err(|err| match err {
                Error::Unrepresentable { dtype, .. } => Error::unrepresentable(PSP_PKEY, dtype),
                other => other,
            })?;
            fragment.set_scalar(PSP_OP, row, &Scalar::UInt8(OpCode::Delete.as_u8()))?;
        }
        self.submit(fragment)
    }

    /// Deletes every row.
    pub fn clear(&mut self) -> Result<ProcessResult> {
        let mut fragment = DataTable::with_len(self.gnode.borrow().input_schema(), 1);
        fragment.set_scalar(PSP_OP, 0, &Scalar::UInt8(OpCode::Clear.as_u8()))?;
        let result = self.submit(fragment)?;
        self.offset = 0;
        Ok(result)
    }

    /// Number of live rows.
    pub fn size(&self) -> usize {
        self.gnode.borrow().num_rows()
    }

    /// User-visible columns, computed columns included.
    pub fn schema(&self) -> Schema {
        self.gnode.borrow().output_schema().clone()
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn get_pkeys(&self) -> Vec<Scalar> {
        self.gnode.borrow().get_pkeys()
    }

    pub fn has_pkey(&self, pkey: &Scalar) -> bool {
        self.gnode.borrow().has_pkey(pkey)
    }

    /// Snapshot of the live rows, `psp_pkey` included.
    pub fn get_table(&self) -> DataTable {
        self.gnode.borrow().get_table()
    }

    /// One output table of the last processing step.
    pub fn step_output(&self, role: PortRole) -> DataTable {
        self.gnode.borrow().output(role).clone()
    }

    pub fn add_computed_columns(&mut self, columns: Vec<ComputedColumn>) -> Result<()> {
        let result = self.gnode.borrow_mut().add_computed_columns(columns);
        self.config.fault_policy.settle(result)
    }

    /// Widens a column's type and rebuilds every view.
    pub fn promote_column(&mut self, name: &str, dtype: DataType) -> Result<()> {
        if self.index.as_deref() == Some(name) {
            return Err(Error::invalid_operation(format!(
                "cannot promote index column {}",
                name
            )));
        }
        let from = self.gnode.borrow().output_schema().dtype_of(name)?;
        if !from.can_promote_to(dtype) {
            return Err(Error::unrepresentable(name, dtype));
        }
        let result = self.gnode.borrow_mut().promote_column(name, dtype);
        self.config.fault_policy.settle(result)
    }

    /// Drops every row; views stay registered and become empty.
    pub fn reset(&mut self) -> Result<()> {
        let result = self.gnode.borrow_mut().reset();
        self.offset = 0;
        self.config.fault_policy.settle(result)
    }

    /// Registers a view over this table.
    pub fn view(&mut self, config: &ViewConfig) -> Result<View> {
        let name = format!("view_{}", self.next_view);
        let handle = {
            let mut gnode = self.gnode.borrow_mut();
            let handle = gnode.register_context(&name, config)?;
            gnode
                .context_mut(handle)?
                .set_deltas_enabled(self.config.deltas_enabled);
            handle
        };
        self.next_view += 1;
        Ok(View::new(
            Rc::downgrade(&self.gnode),
            handle,
            config.clone(),
            &self.config,
        ))
    }

    /// Number of registered views.
    pub fn num_views(&self) -> usize {
        self.gnode.borrow().num_contexts()
    }

    fn declared_columns(&self) -> Vec<String> {
        self.gnode.borrow().input_schema().without_internal().names().to_vec()
    }

    fn ingest(&mut self, rows: &[Vec<Scalar>], op: OpCode) -> Result<ProcessResult> {
        let declared = self.declared_columns();
        if let Some(row) = rows.iter().find(|r| r.len() > declared.len()) {
            return Err(Error::invalid_operation(format!(
                "row has {} values, table has {} columns",
                row.len(),
                declared.len()
            )));
        }

        let mut fragment = DataTable::with_len(self.gnode.borrow().input_schema(), rows.len());
        for (row, values) in rows.iter().enumerate() {
            for (name, value) in declared.iter().zip(values) {
                self.write_cell(&mut fragment, name, row, value)?;
            }
            let pkey = match &self.index {
                Some(index) => fragment.get_scalar(index, row)?,
                None => {
                    let offset = match self.config.limit {
                        Some(limit) => self.offset % limit,
                        None => self.offset,
                    };
                    self.offset += 1;
                    Scalar::Int64(offset as i64)
                }
            };
            fragment.set_scalar(PSP_PKEY, row, &pkey)?;
            fragment.set_scalar(PSP_OP, row, &Scalar::UInt8(op.as_u8()))?;
        }
        self.submit(fragment)
    }

    fn write_cell(&mut self, fragment: &mut DataTable, name: &str, row: usize, value: &Scalar) -> Result<()> {
        let from = match fragment.set_scalar(name, row, value) {
            Err(Error::Unrepresentable { dtype, .. }) => dtype,
            other => return other,
        };
        let target = promotion_target(from, value);
        if self.index.as_deref() == Some(name) || !from.can_promote_to(target) {
            return Err(Error::unrepresentable(name, from));
        }
        log::info!("promoting {} from {:?} to {:?} to fit {}", name, from, target, value);
        let result = self.gnode.borrow_mut().promote_column(name, target);
        self.config.fault_policy.settle(result)?;
        fragment.promote_column(name, target, row, false)?;
        fragment.set_scalar(name, row, value)
    }

    fn submit(&mut self, fragment: DataTable) -> Result<ProcessResult> {
        let rows = fragment.size();
        let result = {
            let mut gnode = self.gnode.borrow_mut();
            gnode.send(0, fragment).and_then(|_| gnode.process(0))
        };
        let result = self.config.fault_policy.settle(result)?;
        log::debug!(
            "table update: {} rows in, {} flattened, notify {}",
            rows,
            result.flattened,
            result.should_notify
        );
        Ok(result)
    }
}

/// Integers overflowing their column, or fed a fractional value, widen to
/// `float64`; every other misfit falls back to `string`.
fn promotion_target(from: DataType, value: &Scalar) -> DataType {
    if from.is_integer() && value.cast(DataType::Float64).is_some() {
        DataType::Float64
    } else {
        DataType::String
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FaultPolicy;
    use alloc::vec;

    fn schema() -> Schema {
        Schema::from_pairs(&[
            ("id", DataType::Int32),
            ("category", DataType::String),
            ("amount", DataType::Int32),
        ])
        .unwrap()
    }

    fn row(id: i32, category: &str, amount: i32) -> Vec<Scalar> {
        vec![Scalar::Int32(id), Scalar::str(category), Scalar::Int32(amount)]
    }

    fn config() -> EngineConfig {
        EngineConfig::new().fault_policy(FaultPolicy::Report)
    }

    #[test]
    fn test_update_and_remove() {
        let mut table = Table::new(&schema(), Some("id"), config()).unwrap();
        table.update(&[row(1, "A", 10), row(2, "B", 5)]).unwrap();
        assert_eq!(table.size(), 2);
        assert!(table.has_pkey(&Scalar::Int32(2)));

        table.remove(&[Scalar::Int32(2)]).unwrap();
        assert_eq!(table.get_pkeys(), vec![Scalar::Int32(1)]);

        table.clear().unwrap();
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn test_partial_row_keeps_stored_values() {
        let mut table = Table::new(&schema(), Some("id"), config()).unwrap();
        table.update(&[row(1, "A", 10)]).unwrap();
        table.update(&[vec![Scalar::Int32(1), Scalar::str("B")]]).unwrap();
        let snapshot = table.get_table();
        assert_eq!(snapshot.get_scalar("category", 0).unwrap(), Scalar::str("B"));
        assert_eq!(snapshot.get_scalar("amount", 0).unwrap(), Scalar::Int32(10));
    }

    #[test]
    fn test_ring_buffer_keys() {
        let mut table = Table::new(&schema(), None, config().limit(2)).unwrap();
        table
            .update(&[row(1, "A", 1), row(2, "A", 2), row(3, "A", 3)])
            .unwrap();
        assert_eq!(table.size(), 2);
        // Offset 2 wrapped onto key 0.
        let snapshot = table.get_table();
        let first = (0..snapshot.size())
            .find(|&r| snapshot.get_scalar(PSP_PKEY, r).unwrap() == Scalar::Int64(0))
            .unwrap();
        assert_eq!(snapshot.get_scalar("id", first).unwrap(), Scalar::Int32(3));
    }

    #[test]
    fn test_overflow_promotes_to_float() {
        let mut table = Table::new(&schema(), Some("id"), config()).unwrap();
        table.update(&[row(1, "A", 10)]).unwrap();
        table
            .update(&[vec![Scalar::Int32(2), Scalar::str("A"), Scalar::Float64(2.5)]])
            .unwrap();
        assert_eq!(table.schema().dtype_of("amount").unwrap(), DataType::Float64);
        let snapshot = table.get_table();
        let amounts: Vec<Scalar> = (0..2)
            .map(|r| snapshot.get_scalar("amount", r).unwrap())
            .collect();
        assert!(amounts.contains(&Scalar::Float64(10.0)));
        assert!(amounts.contains(&Scalar::Float64(2.5)));
    }

    #[test]
    fn test_token_promotes_to_string() {
        let mut table = Table::new(&schema(), Some("id"), config()).unwrap();
        table.update(&[row(1, "A", 10)]).unwrap();
        table
            .update(&[vec![Scalar::Int32(2), Scalar::str("A"), Scalar::str("n/a")]])
            .unwrap();
        assert_eq!(table.schema().dtype_of("amount").unwrap(), DataType::String);
        assert_eq!(table.size(), 2);
    }

    #[test]
    fn test_index_is_never_promoted() {
        let mut table = Table::new(&schema(), Some("id"), config()).unwrap();
        let err = table
            .update(&[vec![Scalar::str("one"), Scalar::str("A"), Scalar::Int32(1)]])
            .unwrap_err();
        assert_eq!(err, Error::unrepresentable("id", DataType::Int32));
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Table::new(&schema(), Some("missing"), config()).is_err());
        assert!(Table::new(&Schema::new(), None, config()).is_err());

        let mut table = Table::new(&schema(), Some("id"), config()).unwrap();
        let mut long = row(1, "A", 1);
        long.push(Scalar::Int32(9));
        assert!(table.update(&[long]).is_err());

        let batch = DataTable::with_len(&Schema::from_pairs(&[("other", DataType::Int32)]).unwrap(), 1);
        assert_eq!(
            table.update_columns(&batch).unwrap_err(),
            Error::column_not_found("other")
        );
    }

    #[test]
    fn test_update_columns() {
        let mut table = Table::new(&schema(), Some("id"), config()).unwrap();
        let mut batch = DataTable::with_len(
            &Schema::from_pairs(&[("id", DataType::Int32), ("amount", DataType::Int32)]).unwrap(),
            2,
        );
        for r in 0..2 {
            batch.set_scalar("id", r, &Scalar::Int32(r as i32)).unwrap();
            batch.set_scalar("amount", r, &Scalar::Int32(10 * r as i32)).unwrap();
        }
        table.update_columns(&batch).unwrap();
        assert_eq!(table.size(), 2);
        assert!(table.get_table().get_scalar("category", 0).unwrap().is_null());
    }
}
