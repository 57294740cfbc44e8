//! Ordered table schemas.

use crate::error::{Error, Result};
use crate::types::DataType;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

/// Internal primary-key column of input fragments and the master table.
pub const PSP_PKEY: &str = "psp_pkey";
/// Internal operation-code column of input fragments.
pub const PSP_OP: &str = "psp_op";
/// Internal ordering-key column.
pub const PSP_OKEY: &str = "psp_okey";

/// Returns true for the reserved internal column names.
pub fn is_internal_name(name: &str) -> bool {
    matches!(name, PSP_PKEY | PSP_OP | PSP_OKEY)
}

/// An ordered mapping of unique column names to types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    names: Vec<String>,
    types: Vec<DataType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from `(name, type)` pairs.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[(S, DataType)]) -> Result<Self> {
        let mut schema = Schema::new();
        for (name, dtype) in pairs {
            schema.add_column(name.as_ref(), *dtype)?;
        }
        Ok(schema)
    }

    /// Adds a column; names must be unique.
    pub fn add_column(&mut self, name: &str, dtype: DataType) -> Result<()> {
        if self.has_column(name) {
            return Err(Error::duplicate_column(name));
        }
        self.names.push(name.to_string());
        self.types.push(dtype);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DataType)> + '_ {
        self.names.iter().map(String::as_str).zip(self.types.iter().copied())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get_index(name).is_some()
    }

    pub fn get_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn get_dtype(&self, name: &str) -> Option<DataType> {
        self.get_index(name).map(|idx| self.types[idx])
    }

    /// Looks up a column type, failing with `ColumnNotFound`.
    pub fn dtype_of(&self, name: &str) -> Result<DataType> {
        self.get_dtype(name).ok_or_else(|| Error::column_not_found(name))
    }

    /// Changes the declared type of a column.
    pub fn retype(&mut self, name: &str, dtype: DataType) -> Result<()> {
        let idx = self.get_index(name).ok_or_else(|| Error::column_not_found(name))?;
        self.types[idx] = dtype;
        Ok(())
    }

    /// Returns the input schema: this schema plus `psp_pkey` and `psp_op`.
    pub fn to_input_schema(&self, pkey_dtype: DataType) -> Result<Schema> {
        let mut input = self.without_internal();
        input.add_column(PSP_PKEY, pkey_dtype)?;
        input.add_column(PSP_OP, DataType::UInt8)?;
        Ok(input)
    }

    /// Returns a copy without the internal columns.
    pub fn without_internal(&self) -> Schema {
        let mut out = Schema::new();
        for (name, dtype) in self.iter() {
            if !is_internal_name(name) {
                out.names.push(name.to_string());
                out.types.push(dtype);
            }
        }
        out
    }

    /// Returns the `name → canonical type name` mapping in column order.
    pub fn type_map(&self) -> Vec<(String, &'static str)> {
        self.iter()
            .map(|(name, dtype)| (name.to_string(), dtype.type_name()))
            .collect()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, (name, dtype)) in self.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, dtype.descr())?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::from_pairs(&[
            ("id", DataType::Int32),
            ("category", DataType::String),
            ("amount", DataType::Float64),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup() {
        let schema = sample();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.get_index("amount"), Some(2));
        assert_eq!(schema.get_dtype("category"), Some(DataType::String));
        assert!(schema.dtype_of("missing").is_err());
    }

    #[test]
    fn test_duplicate_column() {
        let mut schema = sample();
        assert_eq!(
            schema.add_column("id", DataType::Int64),
            Err(Error::duplicate_column("id"))
        );
    }

    #[test]
    fn test_input_schema() {
        let input = sample().to_input_schema(DataType::Int32).unwrap();
        assert_eq!(input.len(), 5);
        assert_eq!(input.get_dtype(PSP_OP), Some(DataType::UInt8));
        assert_eq!(input.get_dtype(PSP_PKEY), Some(DataType::Int32));
        assert_eq!(input.without_internal(), sample());
    }

    #[test]
    fn test_type_map_and_display() {
        let schema = sample();
        let map = schema.type_map();
        assert_eq!(map[0], ("id".to_string(), "integer"));
        assert_eq!(map[2], ("amount".to_string(), "float"));
        assert_eq!(
            alloc::format!("{}", schema),
            "{id: int32, category: str, amount: float64}"
        );
    }
}
