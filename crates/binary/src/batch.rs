//! Column-major extraction of table windows.

use crate::layout::BinaryDataType;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::ops::Range;
use rill_core::{CellType, Column, ColumnData, DataTable, DataType, Error, Result, Scalar};

/// One extracted column: typed values plus validity.
#[derive(Clone, Debug)]
pub struct ColumnBuffer {
    name: String,
    column: Column,
}

impl ColumnBuffer {
    /// Copies rows `range` of `column`.
    pub fn from_column(name: &str, column: &Column, range: Range<usize>) -> Result<Self> {
        BinaryDataType::from_dtype(column.dtype())?;
        let end = range.end.min(column.len());
        let start = range.start.min(end);
        let indices: Vec<usize> = (start..end).collect();
        Ok(Self {
            name: name.to_string(),
            column: column.gather(&indices),
        })
    }

    /// Builds a column of `dtype` from row-major cells.
    pub fn from_scalars(name: &str, dtype: DataType, values: &[Scalar]) -> Result<Self> {
        BinaryDataType::from_dtype(dtype)?;
        Ok(Self {
            name: name.to_string(),
            column: Column::from_scalars(dtype, values)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DataType {
        self.column.dtype()
    }

    pub fn len(&self) -> usize {
        self.column.len()
    }

    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.column.null_count()
    }

    /// Native values; the cells under invalid bits hold defaults.
    pub fn data(&self) -> &ColumnData {
        self.column.data()
    }

    /// Typed view of the values.
    pub fn values<T: CellType>(&self) -> Option<&[T]> {
        self.column.values::<T>()
    }

    /// Validity packed LSB-first, one bit per row.
    pub fn validity_bytes(&self) -> Vec<u8> {
        self.column.validity().to_bytes()
    }

    pub fn is_valid(&self, row: usize) -> bool {
        self.column.is_valid(row)
    }

    pub fn get(&self, row: usize) -> Scalar {
        self.column.get_scalar(row)
    }
}

/// A window of rows in column-major form.
#[derive(Clone, Debug, Default)]
pub struct ColumnarBatch {
    num_rows: usize,
    columns: Vec<ColumnBuffer>,
}

impl ColumnarBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts `rows` of every column of `table`, skipping internal
    /// columns unless `include_internal`.
    pub fn from_table(table: &DataTable, rows: Range<usize>, include_internal: bool) -> Result<Self> {
        let mut batch = Self::new();
        for (idx, (name, _)) in table.schema().iter().enumerate() {
            if !include_internal && table.is_internal(name) {
                continue;
            }
            batch.push(ColumnBuffer::from_column(name, table.column_at(idx), rows.clone())?)?;
        }
        Ok(batch)
    }

    /// Transposes row-major cells, as returned by `get_data`, into columns.
    ///
    /// `cells` holds `rows * columns.len()` values in row order.
    pub fn from_row_major<S: AsRef<str>>(columns: &[(S, DataType)], cells: &[Scalar]) -> Result<Self> {
        let width = columns.len();
        if width == 0 {
            return Ok(Self::new());
        }
        if cells.len() % width != 0 {
            return Err(Error::invalid_operation(
                "cell count is not a multiple of the column count",
            ));
        }
        let rows = cells.len() / width;
        let mut batch = Self::new();
        for (col, (name, dtype)) in columns.iter().enumerate() {
            let values: Vec<Scalar> = (0..rows).map(|r| cells[r * width + col].clone()).collect();
            batch.push(ColumnBuffer::from_scalars(name.as_ref(), *dtype, &values)?)?;
        }
        Ok(batch)
    }

    /// Appends a column; its length must match the batch.
    pub fn push(&mut self, column: ColumnBuffer) -> Result<()> {
        if self.columns.is_empty() {
            self.num_rows = column.len();
        } else if column.len() != self.num_rows {
            return Err(Error::invalid_operation("column length does not match batch"));
        }
        if self.columns.iter().any(|c| c.name == column.name) {
            return Err(Error::duplicate_column(&column.name));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnBuffer] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnBuffer> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_nulls(&self) -> bool {
        self.columns.iter().any(|c| c.null_count() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use rill_core::{Schema, PSP_PKEY};

    fn table() -> DataTable {
        let schema = Schema::from_pairs(&[
            ("name", DataType::String),
            ("amount", DataType::Float64),
        ])
        .unwrap()
        .to_input_schema(DataType::Int32)
        .unwrap();
        let mut table = DataTable::with_len(&schema, 10);
        for row in 0..10 {
            table.set_scalar(PSP_PKEY, row, &Scalar::Int32(row as i32)).unwrap();
            if row % 3 != 0 {
                table.set_scalar("amount", row, &Scalar::Float64(row as f64)).unwrap();
            }
            table.set_scalar("name", row, &Scalar::str("x")).unwrap();
        }
        table
    }

    #[test]
    fn test_window_extraction() {
        let batch = ColumnarBatch::from_table(&table(), 2..7, false).unwrap();
        assert_eq!(batch.num_rows(), 5);
        assert_eq!(batch.num_columns(), 2);

        let amount = batch.column("amount").unwrap();
        assert_eq!(amount.values::<f64>().unwrap()[2], 4.0);
        // rows 3 and 6 are null
        assert_eq!(amount.null_count(), 2);
        assert_eq!(amount.validity_bytes(), vec![0b0000_1101]);
        assert!(batch.has_nulls());
    }

    #[test]
    fn test_window_clamps_to_table() {
        let batch = ColumnarBatch::from_table(&table(), 8..20, true).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert!(batch.column(PSP_PKEY).is_some());
    }

    #[test]
    fn test_from_row_major() {
        let cells = vec![
            Scalar::str("a"),
            Scalar::Float64(1.0),
            Scalar::str("b"),
            Scalar::Null,
        ];
        let batch = ColumnarBatch::from_row_major(
            &[("k", DataType::String), ("v", DataType::Float64)],
            &cells,
        )
        .unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.column("k").unwrap().get(1), Scalar::str("b"));
        assert_eq!(batch.column("v").unwrap().null_count(), 1);

        let empty = ColumnarBatch::from_row_major(&[("k", DataType::String)], &[]).unwrap();
        assert_eq!(empty.num_rows(), 0);
        assert!(ColumnarBatch::from_row_major(
            &[("k", DataType::String), ("v", DataType::Float64)],
            &cells[..3],
        )
        .is_err());
    }

    #[test]
    fn test_object_column_rejected() {
        let err = ColumnBuffer::from_scalars("o", DataType::Object, &[Scalar::Null]).unwrap_err();
        assert_eq!(err, Error::unsupported_type(DataType::Object));
    }
}
