//! Collapsing drained input into one row per primary key.
//!
//! Rows are folded in arrival order. A later row overwrites the cells it
//! carries and leaves the others alone, so an invalid cell never erases an
//! earlier valid one. Op codes compose as follows:
//!
//! | pending  | incoming        | result                 |
//! |----------|-----------------|------------------------|
//! | any      | DELETE          | DELETE, image cleared  |
//! | DELETE   | INSERT / UPDATE | INSERT, `reset`        |
//! | INSERT   | UPDATE          | INSERT                 |
//! | UPDATE   | INSERT / UPDATE | the incoming op        |
//!
//! A CLEAR turns every pending row into a DELETE. Keys written after it are
//! `reset`, and every stored key the batch does not write again gets a
//! synthesized DELETE row.

use alloc::vec::Vec;
use hashbrown::HashMap;
use rill_core::{
    Column, DataTable, InvariantViolation, OpCode, Result, Scalar, Schema, PSP_OP, PSP_PKEY,
};
use rill_storage::GState;

/// Input collapsed to one row per key touched, in order of first appearance.
#[derive(Clone, Debug)]
pub struct Flattened {
    /// Master columns plus `psp_op`.
    pub table: DataTable,
    /// Resolved op of each row.
    pub ops: Vec<OpCode>,
    /// Rows whose image was replaced within the batch. They never fall back
    /// to the stored image.
    pub reset: Vec<bool>,
    /// Primary key of each row.
    pub pkeys: Vec<Scalar>,
}

impl Flattened {
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

struct Folder<'a> {
    table: DataTable,
    ops: Vec<OpCode>,
    reset: Vec<bool>,
    pkeys: Vec<Scalar>,
    index: HashMap<Scalar, usize>,
    /// Flattened column index for each input column; None for `psp_op`.
    targets: Vec<Option<usize>>,
    image: Vec<usize>,
    input: &'a DataTable,
}

impl<'a> Folder<'a> {
    fn row_for(&mut self, pkey: &Scalar, pkey_idx: usize, fresh: bool) -> Result<(usize, bool)> {
        if let Some(&row) = self.index.get(pkey) {
            return Ok((row, false));
        }
        let row = self.ops.len();
        self.table.extend(1);
        self.table.column_at_mut(pkey_idx).set_scalar(row, pkey)?;
        self.index.insert(pkey.clone(), row);
        self.ops.push(OpCode::Insert);
        self.reset.push(fresh);
        self.pkeys.push(pkey.clone());
        Ok((row, true))
    }

    fn clear_image(&mut self, row: usize) {
        for &idx in &self.image {
            self.table.column_at_mut(idx).clear_cell(row);
        }
    }

    fn merge(&mut self, row: usize, src_row: usize) -> Result<()> {
        for (src_idx, target) in self.targets.iter().enumerate() {
            let Some(dst_idx) = *target else { continue };
            let src: &Column = self.input.column_at(src_idx);
            if src.is_valid(src_row) {
                self.table
                    .column_at_mut(dst_idx)
                    .copy_cell_from(row, src, src_row)?;
            }
        }
        Ok(())
    }
}

/// Folds `input` (an input-schema table) into the flattened schema `schema`.
pub fn flatten(input: &DataTable, gstate: &GState, schema: &Schema) -> Result<Flattened> {
    let pkey_idx = schema
        .get_index(PSP_PKEY)
        .ok_or_else(|| rill_core::Error::column_not_found(PSP_PKEY))?;
    let op_idx = schema
        .get_index(PSP_OP)
        .ok_or_else(|| rill_core::Error::column_not_found(PSP_OP))?;

    let raw_ops = input.get_column(PSP_OP)?;
    let raw_ops = raw_ops
        .values::<u8>()
        .ok_or_else(|| InvariantViolation::DtypeMismatch {
            column: PSP_OP.into(),
            expected: rill_core::DataType::UInt8,
            got: raw_ops.dtype(),
        })?;
    let input_pkeys = input.get_column(PSP_PKEY)?;

    let mut targets = Vec::with_capacity(input.num_columns());
    for name in input.schema().names() {
        if name == PSP_OP {
            targets.push(None);
        } else {
            let idx = schema
                .get_index(name)
                .ok_or_else(|| rill_core::Error::column_not_found(name.as_str()))?;
            targets.push(Some(idx));
        }
    }
    let image = (0..schema.len())
        .filter(|&idx| idx != pkey_idx && idx != op_idx)
        .collect();

    let mut folder = Folder {
        table: DataTable::new(schema),
        ops: Vec::new(),
        reset: Vec::new(),
        pkeys: Vec::new(),
        index: HashMap::new(),
        targets,
        image,
        input,
    };
    let mut cleared = false;

    for src_row in 0..input.size() {
        let op = OpCode::try_from(raw_ops[src_row])?;
        if op == OpCode::Clear {
            for row in 0..folder.ops.len() {
                folder.ops[row] = OpCode::Delete;
                folder.reset[row] = false;
                folder.clear_image(row);
            }
            cleared = true;
            continue;
        }

        let pkey = input_pkeys.get_scalar(src_row);
        if pkey.is_null() {
            log::warn!("dropping input row {} without a primary key", src_row);
            continue;
        }
        let (row, created) = folder.row_for(&pkey, pkey_idx, cleared)?;

        match op {
            OpCode::Delete => {
                folder.ops[row] = OpCode::Delete;
                folder.reset[row] = false;
                folder.clear_image(row);
            }
            _ => {
                if created {
                    folder.ops[row] = if folder.reset[row] { OpCode::Insert } else { op };
                } else if folder.ops[row] == OpCode::Delete {
                    folder.ops[row] = OpCode::Insert;
                    folder.reset[row] = true;
                } else if folder.ops[row] != OpCode::Insert {
                    folder.ops[row] = op;
                }
                folder.merge(row, src_row)?;
            }
        }
    }

    if cleared {
        for pkey in gstate.get_pkeys() {
            if !folder.index.contains_key(&pkey) {
                let (row, _) = folder.row_for(&pkey, pkey_idx, false)?;
                folder.ops[row] = OpCode::Delete;
            }
        }
    }

    let mut table = folder.table;
    {
        let column = table.column_at_mut(op_idx);
        for (row, op) in folder.ops.iter().enumerate() {
            column.set_scalar(row, &Scalar::UInt8(op.as_u8()))?;
        }
    }

    Ok(Flattened {
        table,
        ops: folder.ops,
        reset: folder.reset,
        pkeys: folder.pkeys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use rill_core::DataType;

    fn schemas() -> (Schema, Schema) {
        let output = Schema::from_pairs(&[("name", DataType::String), ("amount", DataType::Float64)])
            .unwrap();
        let input = output.to_input_schema(DataType::Int32).unwrap();
        let mut flat = output.clone();
        flat.add_column(PSP_PKEY, DataType::Int32).unwrap();
        flat.add_column(PSP_OP, DataType::UInt8).unwrap();
        (input, flat)
    }

    fn input(schema: &Schema, rows: &[(OpCode, i32, Option<&str>, Option<f64>)]) -> DataTable {
        let mut table = DataTable::with_len(schema, rows.len());
        for (row, (op, pkey, name, amount)) in rows.iter().enumerate() {
            table.set_scalar(PSP_OP, row, &Scalar::UInt8(op.as_u8())).unwrap();
            table.set_scalar(PSP_PKEY, row, &Scalar::Int32(*pkey)).unwrap();
            if let Some(name) = name {
                table.set_scalar("name", row, &Scalar::str(name)).unwrap();
            }
            if let Some(amount) = amount {
                table.set_scalar("amount", row, &Scalar::Float64(*amount)).unwrap();
            }
        }
        table
    }

    fn stored(keys: &[i32]) -> GState {
        let schema = Schema::from_pairs(&[("name", DataType::String), ("amount", DataType::Float64)])
            .unwrap();
        let mut gstate = GState::new(&schema, DataType::Int32).unwrap();
        let row = DataTable::with_len(&schema, 1);
        for key in keys {
            gstate.upsert(&Scalar::Int32(*key), &row, 0).unwrap();
        }
        gstate
    }

    #[test]
    fn test_one_row_per_key_in_first_appearance_order() {
        let (input_schema, flat) = schemas();
        let data = input(
            &input_schema,
            &[
                (OpCode::Insert, 2, Some("b"), Some(1.0)),
                (OpCode::Insert, 1, Some("a"), Some(2.0)),
                (OpCode::Update, 2, None, Some(3.0)),
            ],
        );
        let out = flatten(&data, &stored(&[]), &flat).unwrap();
        assert_eq!(out.pkeys, vec![Scalar::Int32(2), Scalar::Int32(1)]);
        assert_eq!(out.ops, vec![OpCode::Insert, OpCode::Insert]);
        // The update's missing name keeps the earlier valid one.
        assert_eq!(out.table.get_scalar("name", 0).unwrap(), Scalar::str("b"));
        assert_eq!(out.table.get_scalar("amount", 0).unwrap(), Scalar::Float64(3.0));
    }

    #[test]
    fn test_insert_after_delete_resets() {
        let (input_schema, flat) = schemas();
        let data = input(
            &input_schema,
            &[
                (OpCode::Update, 1, Some("a"), Some(1.0)),
                (OpCode::Delete, 1, None, None),
                (OpCode::Insert, 1, None, Some(5.0)),
            ],
        );
        let out = flatten(&data, &stored(&[1]), &flat).unwrap();
        assert_eq!(out.ops, vec![OpCode::Insert]);
        assert_eq!(out.reset, vec![true]);
        assert!(out.table.get_scalar("name", 0).unwrap().is_null());
        assert_eq!(out.table.get_scalar("amount", 0).unwrap(), Scalar::Float64(5.0));
    }

    #[test]
    fn test_delete_after_insert() {
        let (input_schema, flat) = schemas();
        let data = input(
            &input_schema,
            &[(OpCode::Insert, 7, Some("x"), None), (OpCode::Delete, 7, None, None)],
        );
        let out = flatten(&data, &stored(&[]), &flat).unwrap();
        assert_eq!(out.ops, vec![OpCode::Delete]);
        assert!(out.table.get_scalar("name", 0).unwrap().is_null());
        assert_eq!(out.table.get_scalar(PSP_OP, 0).unwrap(), Scalar::UInt8(2));
    }

    #[test]
    fn test_clear_deletes_untouched_keys() {
        let (input_schema, flat) = schemas();
        let mut data = input(
            &input_schema,
            &[
                (OpCode::Update, 1, None, Some(1.0)),
                (OpCode::Insert, 1, None, None),
                (OpCode::Insert, 3, None, Some(3.0)),
            ],
        );
        data.set_scalar(PSP_OP, 1, &Scalar::UInt8(OpCode::Clear.as_u8()))
            .unwrap();
        let out = flatten(&data, &stored(&[1, 2, 3]), &flat).unwrap();

        assert_eq!(
            out.pkeys,
            vec![Scalar::Int32(1), Scalar::Int32(3), Scalar::Int32(2)]
        );
        assert_eq!(out.ops, vec![OpCode::Delete, OpCode::Insert, OpCode::Delete]);
        assert_eq!(out.reset, vec![false, true, false]);
    }

    #[test]
    fn test_unknown_op() {
        let (input_schema, flat) = schemas();
        let mut data = input(&input_schema, &[(OpCode::Insert, 1, None, None)]);
        data.set_scalar(PSP_OP, 0, &Scalar::UInt8(9)).unwrap();
        let err = flatten(&data, &stored(&[]), &flat).unwrap_err();
        assert_eq!(err, rill_core::Error::from(InvariantViolation::UnknownOp(9)));
    }
}
