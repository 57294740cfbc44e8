//! Hand-built notification batches for context tests.

use crate::notify::{NotifyTables, PSP_EXISTED};
use alloc::vec::Vec;
use rill_core::{
    DataTable, DataType, OpCode, Scalar, Schema, TransitionInputs, ValueTransition, PSP_OP,
};

/// Master schema `{category, region: string, amount: float64, psp_pkey: int32}`.
pub(crate) fn master() -> Schema {
    let mut schema = Schema::from_pairs(&[
        ("category", DataType::String),
        ("region", DataType::String),
        ("amount", DataType::Float64),
    ])
    .unwrap();
    schema.add_column(rill_core::PSP_PKEY, DataType::Int32).unwrap();
    schema
}

/// A master row image.
pub(crate) fn image(pkey: i32, category: &str, region: &str, amount: f64) -> Vec<Scalar> {
    alloc::vec![
        Scalar::str(category),
        Scalar::str(region),
        Scalar::Float64(amount),
        Scalar::Int32(pkey),
    ]
}

/// One processing step, built row by row.
pub(crate) struct Batch {
    flattened: DataTable,
    delta: DataTable,
    prev: DataTable,
    current: DataTable,
    transitions: DataTable,
    existed: DataTable,
}

impl Batch {
    pub fn new(master: &Schema) -> Self {
        let mut flat = master.clone();
        flat.add_column(PSP_OP, DataType::UInt8).unwrap();
        let delta: Vec<_> = master.iter().map(|(n, t)| (n, t.delta_type())).collect();
        let transitions: Vec<_> = master.iter().map(|(n, _)| (n, DataType::UInt8)).collect();
        Self {
            flattened: DataTable::new(&flat),
            delta: DataTable::new(&Schema::from_pairs(&delta).unwrap()),
            prev: DataTable::new(master),
            current: DataTable::new(master),
            transitions: DataTable::new(&Schema::from_pairs(&transitions).unwrap()),
            existed: DataTable::new(&Schema::from_pairs(&[(PSP_EXISTED, DataType::Bool)]).unwrap()),
        }
    }

    pub fn row(mut self, prev: Option<Vec<Scalar>>, cur: Option<Vec<Scalar>>) -> Self {
        let row = self.flattened.size();
        for table in [
            &mut self.flattened,
            &mut self.delta,
            &mut self.prev,
            &mut self.current,
            &mut self.transitions,
            &mut self.existed,
        ] {
            table.extend(1);
        }
        let ncols = self.prev.num_columns();
        let null_row = alloc::vec![Scalar::Null; ncols];
        let p = prev.clone().unwrap_or_else(|| null_row.clone());
        let c = cur.clone().unwrap_or_else(|| null_row.clone());
        let op = match (&prev, &cur) {
            (None, _) => OpCode::Insert,
            (Some(_), None) => OpCode::Delete,
            _ => OpCode::Update,
        };
        for idx in 0..ncols {
            let name = self.prev.schema().names()[idx].clone();
            self.prev.set_scalar(&name, row, &p[idx]).unwrap();
            self.current.set_scalar(&name, row, &c[idx]).unwrap();
            let flat = if cur.is_some() { &c[idx] } else { &p[idx] };
            self.flattened.set_scalar(&name, row, flat).unwrap();

            let transition = if prev.is_some() && cur.is_none() {
                ValueTransition::Deleted
            } else {
                TransitionInputs {
                    row_pre_existed: prev.is_some(),
                    prev_valid: p[idx].is_valid(),
                    cur_valid: c[idx].is_valid(),
                    prev_cur_eq: p[idx] == c[idx],
                    reset: false,
                }
                .classify()
            };
            self.transitions
                .set_scalar(&name, row, &Scalar::UInt8(transition.as_u8()))
                .unwrap();

            let dtype = self.delta.schema().types()[idx];
            let diff = c[idx].as_f64().unwrap_or(0.0) - p[idx].as_f64().unwrap_or(0.0);
            let delta = if dtype.is_floating_point() {
                Scalar::Float64(diff)
            } else if dtype.is_integer() {
                Scalar::Int64(diff as i64)
            } else {
                Scalar::Null
            };
            self.delta.set_scalar(&name, row, &delta).unwrap();
        }
        self.flattened
            .set_scalar(PSP_OP, row, &Scalar::UInt8(op.as_u8()))
            .unwrap();
        self.existed
            .set_scalar(PSP_EXISTED, row, &Scalar::Bool(prev.is_some() || cur.is_some()))
            .unwrap();
        self
    }

    pub fn tables(&self) -> NotifyTables<'_> {
        NotifyTables {
            flattened: &self.flattened,
            delta: &self.delta,
            prev: &self.prev,
            current: &self.current,
            transitions: &self.transitions,
            existed: &self.existed,
        }
    }
}

/// A master snapshot holding `rows`.
pub(crate) fn snapshot(master: &Schema, rows: &[Vec<Scalar>]) -> DataTable {
    let mut table = DataTable::with_len(master, rows.len());
    for (r, values) in rows.iter().enumerate() {
        for (idx, value) in values.iter().enumerate() {
            let name = master.names()[idx].clone();
            table.set_scalar(&name, r, value).unwrap();
        }
    }
    table
}
