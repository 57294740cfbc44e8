//! Data type definitions for Rill.
//!
//! This module defines the primitive column types that can be stored in a
//! `Column`, along with the promotion lattice used when an incoming value
//! does not fit the current representation.

/// Supported column data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// Boolean type (true/false)
    Bool,
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit floating point number
    Float32,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string, interned through a per-column vocabulary
    String,
    /// Calendar date stored as days since the Unix epoch
    Date,
    /// Date and time stored as Unix timestamp (milliseconds)
    DateTime,
    /// Opaque reference-counted payload
    Object,
}

impl DataType {
    /// Numeric types accepted by computed-column arithmetic.
    pub const NUMERIC: [DataType; 10] = [
        DataType::Float64,
        DataType::Float32,
        DataType::Int64,
        DataType::Int32,
        DataType::Int16,
        DataType::Int8,
        DataType::UInt64,
        DataType::UInt32,
        DataType::UInt16,
        DataType::UInt8,
    ];

    /// Returns true for signed and unsigned integer types.
    #[inline]
    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    #[inline]
    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    #[inline]
    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
        )
    }

    #[inline]
    pub fn is_floating_point(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Returns true for integer and floating point types.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_floating_point()
    }

    /// Returns true for types whose cells own a reference-counted payload.
    #[inline]
    pub fn is_vlen(&self) -> bool {
        matches!(self, DataType::String | DataType::Object)
    }

    /// Returns the canonical, user-facing type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::Bool => "boolean",
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => "integer",
            DataType::Float32 | DataType::Float64 => "float",
            DataType::String => "string",
            DataType::Date => "date",
            DataType::DateTime => "datetime",
            DataType::Object => "object",
        }
    }

    /// Returns the storage-level description, e.g. `"int32"`.
    pub fn descr(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::String => "str",
            DataType::Date => "date",
            DataType::DateTime => "datetime",
            DataType::Object => "object",
        }
    }

    /// Parses a canonical type name into the type used to store it.
    pub fn from_type_name(name: &str) -> Option<DataType> {
        match name {
            "integer" => Some(DataType::Int32),
            "float" => Some(DataType::Float64),
            "string" => Some(DataType::String),
            "boolean" => Some(DataType::Bool),
            "date" => Some(DataType::Date),
            "datetime" => Some(DataType::DateTime),
            "object" => Some(DataType::Object),
            _ => None,
        }
    }

    /// Returns the type of the `delta` column computed for this type.
    ///
    /// Every integer type widens to `Int64`, so the difference of two
    /// narrow cells never wraps.
    pub fn delta_type(&self) -> DataType {
        if self.is_integer() {
            DataType::Int64
        } else {
            *self
        }
    }

    /// Returns whether a column of this type can be rewritten as `target`
    /// without losing previously valid data.
    pub fn can_promote_to(&self, target: DataType) -> bool {
        if *self == target {
            return true;
        }
        match target {
            DataType::Float64 => self.is_numeric(),
            DataType::Int64 => {
                self.is_signed_integer()
                    || matches!(self, DataType::UInt8 | DataType::UInt16 | DataType::UInt32)
            }
            DataType::Int32 => matches!(
                self,
                DataType::Int8 | DataType::Int16 | DataType::UInt8 | DataType::UInt16
            ),
            DataType::Int16 => matches!(self, DataType::Int8 | DataType::UInt8),
            DataType::String => !matches!(self, DataType::Object),
            DataType::DateTime => matches!(self, DataType::Date),
            _ => false,
        }
    }
}
