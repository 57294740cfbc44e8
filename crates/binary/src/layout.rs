//! Per-column layout of an encoded batch.
//!
//! Pre-computes type ids and value widths so the encoder writes each block
//! without re-inspecting the schema.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use rill_core::{DataType, Error, Result, Schema};

/// Data type IDs for binary encoding
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryDataType {
    Boolean = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float32 = 9,
    Float64 = 10,
    String = 11,
    Date = 12,
    DateTime = 13,
}

impl BinaryDataType {
    /// Get the fixed size in bytes for this data type
    pub fn fixed_size(self) -> usize {
        match self {
            BinaryDataType::Boolean | BinaryDataType::Int8 | BinaryDataType::UInt8 => 1,
            BinaryDataType::Int16 | BinaryDataType::UInt16 => 2,
            BinaryDataType::Int32
            | BinaryDataType::UInt32
            | BinaryDataType::Float32
            | BinaryDataType::Date => 4,
            BinaryDataType::Int64
            | BinaryDataType::UInt64
            | BinaryDataType::Float64
            | BinaryDataType::DateTime => 8,
            BinaryDataType::String => 8, // (offset: u32, len: u32)
        }
    }

    /// Check if this type uses variable-length storage
    pub fn is_variable_length(self) -> bool {
        matches!(self, BinaryDataType::String)
    }

    /// Maps a column type. Object columns have no byte representation.
    pub fn from_dtype(dtype: DataType) -> Result<Self> {
        Ok(match dtype {
            DataType::Bool => BinaryDataType::Boolean,
            DataType::Int8 => BinaryDataType::Int8,
            DataType::Int16 => BinaryDataType::Int16,
            DataType::Int32 => BinaryDataType::Int32,
            DataType::Int64 => BinaryDataType::Int64,
            DataType::UInt8 => BinaryDataType::UInt8,
            DataType::UInt16 => BinaryDataType::UInt16,
            DataType::UInt32 => BinaryDataType::UInt32,
            DataType::UInt64 => BinaryDataType::UInt64,
            DataType::Float32 => BinaryDataType::Float32,
            DataType::Float64 => BinaryDataType::Float64,
            DataType::String => BinaryDataType::String,
            DataType::Date => BinaryDataType::Date,
            DataType::DateTime => BinaryDataType::DateTime,
            DataType::Object => return Err(Error::unsupported_type(dtype)),
        })
    }
}

/// Layout information for a single column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub name: String,
    pub data_type: BinaryDataType,
    /// Bytes per value in the fixed section
    pub fixed_size: usize,
}

/// Pre-computed layout of every column of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    columns: Vec<ColumnLayout>,
}

impl BatchLayout {
    /// Creates a layout from named column types.
    pub fn new<S: AsRef<str>>(columns: &[(S, DataType)]) -> Result<Self> {
        let columns = columns
            .iter()
            .map(|(name, dtype)| {
                let data_type = BinaryDataType::from_dtype(*dtype)?;
                Ok(ColumnLayout {
                    name: name.as_ref().to_string(),
                    data_type,
                    fixed_size: data_type.fixed_size(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    /// Create a layout from a schema
    pub fn from_schema(schema: &Schema) -> Result<Self> {
        let pairs: Vec<(&str, DataType)> = schema.iter().collect();
        Self::new(&pairs)
    }

    pub fn columns(&self) -> &[ColumnLayout] {
        &self.columns
    }

    /// Size of one validity block in bytes: ceil(rows/8)
    #[inline]
    pub fn validity_size(rows: usize) -> usize {
        (rows + 7) / 8
    }

    /// Bytes of the fixed section for `rows` rows
    pub fn fixed_section_size(&self, rows: usize) -> usize {
        self.columns
            .iter()
            .map(|c| Self::validity_size(rows) + rows * c.fixed_size)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        let layout = BatchLayout::new(&[
            ("id", DataType::Int64),
            ("name", DataType::String),
            ("flag", DataType::Bool),
        ])
        .unwrap();
        assert_eq!(layout.columns().len(), 3);
        assert_eq!(layout.columns()[1].fixed_size, 8);
        // 3 validity blocks of 2 bytes, values 10 * (8 + 8 + 1)
        assert_eq!(layout.fixed_section_size(10), 3 * 2 + 170);
    }

    #[test]
    fn test_object_is_unsupported() {
        let err = BatchLayout::new(&[("payload", DataType::Object)]).unwrap_err();
        assert_eq!(err, Error::unsupported_type(DataType::Object));
    }
}
