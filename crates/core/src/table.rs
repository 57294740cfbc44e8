//! Column-oriented tables.

use crate::column::Column;
use crate::error::{Error, InvariantViolation, Result};
use crate::scalar::Scalar;
use crate::schema::Schema;
use crate::types::DataType;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// A set of named columns sharing one row count.
#[derive(Clone, Debug, Default)]
pub struct DataTable {
    schema: Schema,
    columns: Vec<Column>,
    internal: Vec<bool>,
    size: usize,
}

impl DataTable {
    /// Creates an empty table with one column per schema entry.
    pub fn new(schema: &Schema) -> Self {
        Self::with_len(schema, 0)
    }

    /// Creates a table of `size` invalid rows.
    pub fn with_len(schema: &Schema, size: usize) -> Self {
        let columns = schema
            .types()
            .iter()
            .map(|dtype| Column::with_len(*dtype, size))
            .collect();
        let internal = schema
            .names()
            .iter()
            .map(|n| crate::schema::is_internal_name(n))
            .collect();
        Self {
            schema: schema.clone(),
            columns,
            internal,
            size,
        }
    }

    /// Assembles a table from named columns of equal length.
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self> {
        let mut table = DataTable::default();
        let mut size = None;
        for (name, column) in columns {
            match size {
                None => size = Some(column.len()),
                Some(expected) if expected != column.len() => {
                    return Err(InvariantViolation::LengthMismatch {
                        expected,
                        got: column.len(),
                    }
                    .into())
                }
                _ => {}
            }
            table.schema.add_column(&name, column.dtype())?;
            table.internal.push(crate::schema::is_internal_name(&name));
            table.columns.push(column);
        }
        table.size = size.unwrap_or(0);
        Ok(table)
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Adds a column of `size` invalid cells.
    pub fn add_column(&mut self, name: &str, dtype: DataType, is_internal: bool) -> Result<&mut Column> {
        self.schema.add_column(name, dtype)?;
        self.columns.push(Column::with_len(dtype, self.size));
        self.internal.push(is_internal);
        let idx = self.columns.len() - 1;
        Ok(&mut self.columns[idx])
    }

    /// Whether the named column was added as internal.
    pub fn is_internal(&self, name: &str) -> bool {
        self.schema
            .get_index(name)
            .map(|idx| self.internal[idx])
            .unwrap_or(false)
    }

    pub fn get_column(&self, name: &str) -> Result<&Column> {
        let idx = self.index_of(name)?;
        Ok(&self.columns[idx])
    }

    pub fn get_column_mut(&mut self, name: &str) -> Result<&mut Column> {
        let idx = self.index_of(name)?;
        Ok(&mut self.columns[idx])
    }

    #[inline]
    pub fn column_at(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    #[inline]
    pub fn column_at_mut(&mut self, idx: usize) -> &mut Column {
        &mut self.columns[idx]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.schema
            .get_index(name)
            .ok_or_else(|| Error::column_not_found(name))
    }

    /// Grows every column by `n` invalid rows.
    pub fn extend(&mut self, n: usize) {
        self.set_size(self.size + n);
    }

    /// Resizes every column to `size` rows.
    pub fn set_size(&mut self, size: usize) {
        for column in &mut self.columns {
            column.resize(size);
        }
        self.size = size;
    }

    /// Drops every row, keeping the columns.
    pub fn clear(&mut self) {
        self.set_size(0);
    }

    /// Appends the rows of `other`, whose schema must be identical.
    pub fn append(&mut self, other: &DataTable) -> Result<()> {
        if self.schema != other.schema {
            return Err(InvariantViolation::SchemaMismatch {
                expected: format!("{}", self.schema),
                got: format!("{}", other.schema),
            }
            .into());
        }
        for (dst, src) in self.columns.iter_mut().zip(other.columns.iter()) {
            dst.append(src)?;
        }
        self.size += other.size;
        Ok(())
    }

    /// Writes a cell by column name.
    pub fn set_scalar(&mut self, name: &str, row: usize, value: &Scalar) -> Result<()> {
        let idx = self.index_of(name)?;
        self.columns[idx].set_scalar(row, value).map_err(|err| match err {
            Error::Unrepresentable { dtype, .. } => Error::unrepresentable(name, dtype),
            other => other,
        })
    }

    pub fn get_scalar(&self, name: &str, row: usize) -> Result<Scalar> {
        Ok(self.get_column(name)?.get_scalar(row))
    }

    /// Rewrites a column's type in place; see `Column::promote`.
    pub fn promote_column(&mut self, name: &str, dtype: DataType, from_row: usize, fill_default: bool) -> Result<()> {
        let idx = self.index_of(name)?;
        self.columns[idx].promote(dtype, from_row, fill_default)?;
        self.schema.retype(name, dtype)
    }

    /// Adds `new_name` as a copy of `name`.
    pub fn clone_column(&mut self, name: &str, new_name: &str, is_internal: bool) -> Result<()> {
        let column = self.get_column(name)?.clone();
        self.schema.add_column(new_name, column.dtype())?;
        self.columns.push(column);
        self.internal.push(is_internal);
        Ok(())
    }

    /// Replaces a column's contents; lengths must agree.
    pub fn replace_column(&mut self, name: &str, column: Column) -> Result<()> {
        let idx = self.index_of(name)?;
        if column.len() != self.size {
            return Err(InvariantViolation::LengthMismatch {
                expected: self.size,
                got: column.len(),
            }
            .into());
        }
        self.schema.retype(name, column.dtype())?;
        self.columns[idx] = column;
        Ok(())
    }

    /// Reads one row as scalars in schema order.
    pub fn get_row(&self, row: usize) -> Vec<Scalar> {
        self.columns.iter().map(|c| c.get_scalar(row)).collect()
    }

    /// Returns a new table with the rows at `indices`, in order.
    pub fn select_rows(&self, indices: &[usize]) -> DataTable {
        DataTable {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.gather(indices)).collect(),
            internal: self.internal.clone(),
            size: indices.len(),
        }
    }

    /// Returns a table restricted to the named columns.
    pub fn project(&self, names: &[&str]) -> Result<DataTable> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            columns.push((String::from(*name), self.get_column(name)?.clone()));
        }
        let mut table = DataTable::from_columns(columns)?;
        table.size = self.size;
        Ok(table)
    }
}
