//! Error types for Rill.

use crate::types::DataType;
use alloc::string::String;
use core::fmt;

/// Result type alias for Rill operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Internal invariant violations.
///
/// These never describe bad user input: they mean the engine reached a state
/// it has no defined recovery for, and the batch must not continue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    /// An op code outside of the known set reached the diff.
    UnknownOp(u8),
    /// A fragment was sent whose schema differs from the port schema.
    SchemaMismatch { expected: String, got: String },
    /// A stored column does not carry its declared type.
    DtypeMismatch {
        column: String,
        expected: DataType,
        got: DataType,
    },
    /// No promotion path exists between two types.
    NoPromotionPath { from: DataType, to: DataType },
    /// A computed function has no implementation for the given input types.
    NoComputation { function: String, inputs: String },
    /// Columns or tables of one batch disagree on row count.
    LengthMismatch { expected: usize, got: usize },
    /// The gnode was used before `init`.
    NotInitialized,
    /// The gnode was used after a fault.
    Faulted,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::UnknownOp(op) => write!(f, "Unknown OP: {}", op),
            InvariantViolation::SchemaMismatch { expected, got } => {
                write!(f, "Schema mismatch: expected {}, got {}", expected, got)
            }
            InvariantViolation::DtypeMismatch {
                column,
                expected,
                got,
            } => write!(
                f,
                "Column {} stored as {:?} but declared {:?}",
                column, got, expected
            ),
            InvariantViolation::NoPromotionPath { from, to } => {
                write!(f, "No promotion path from {:?} to {:?}", from, to)
            }
            InvariantViolation::NoComputation { function, inputs } => {
                write!(f, "No computation found for {}({})", function, inputs)
            }
            InvariantViolation::LengthMismatch { expected, got } => {
                write!(f, "Length mismatch: expected {} rows, got {}", expected, got)
            }
            InvariantViolation::NotInitialized => write!(f, "Gnode used before init"),
            InvariantViolation::Faulted => write!(f, "Gnode is faulted"),
        }
    }
}

/// Error types for Rill operations.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Column not found in a schema or table.
    ColumnNotFound { column: String },
    /// Column declared twice.
    DuplicateColumn { column: String },
    /// Type mismatch error.
    TypeMismatch { expected: DataType, got: DataType },
    /// The value cannot be stored in the column's current type.
    Unrepresentable { column: String, dtype: DataType },
    /// Unknown aggregate name.
    UnknownAggregate { name: String },
    /// Unknown filter operator.
    UnknownFilterOp { name: String },
    /// Unknown sort order.
    UnknownSortOrder { name: String },
    /// Rejected configuration.
    InvalidConfig { message: String },
    /// The type is not supported by the requested operation.
    UnsupportedType { dtype: DataType },
    /// No context registered under the name.
    ContextNotFound { name: String },
    /// The handle refers to a context that was unregistered.
    StaleHandle,
    /// The view's table was dropped or the view was deleted.
    ViewDetached,
    /// A batch hit an invariant violation and the engine was faulted.
    Fault { message: String },
    /// Invalid operation.
    InvalidOperation { message: String },
    /// Internal invariant violation.
    Invariant(InvariantViolation),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ColumnNotFound { column } => write!(f, "Column not found: {}", column),
            Error::DuplicateColumn { column } => write!(f, "Duplicate column: {}", column),
            Error::TypeMismatch { expected, got } => {
                write!(f, "Type mismatch: expected {:?}, got {:?}", expected, got)
            }
            Error::Unrepresentable { column, dtype } => {
                write!(f, "Value not representable as {:?} in column {}", dtype, column)
            }
            Error::UnknownAggregate { name } => write!(f, "Unknown aggregate: {}", name),
            Error::UnknownFilterOp { name } => write!(f, "Unknown filter operator: {}", name),
            Error::UnknownSortOrder { name } => write!(f, "Unknown sort order: {}", name),
            Error::InvalidConfig { message } => write!(f, "Invalid configuration: {}", message),
            Error::UnsupportedType { dtype } => write!(f, "Unsupported type: {:?}", dtype),
            Error::ContextNotFound { name } => write!(f, "Context not found: {}", name),
            Error::StaleHandle => write!(f, "Stale context handle"),
            Error::ViewDetached => write!(f, "View is detached from its table"),
            Error::Fault { message } => write!(f, "Engine fault: {}", message),
            Error::InvalidOperation { message } => write!(f, "Invalid operation: {}", message),
            Error::Invariant(v) => write!(f, "Invariant violation: {}", v),
        }
    }
}

impl From<InvariantViolation> for Error {
    fn from(v: InvariantViolation) -> Self {
        Error::Invariant(v)
    }
}

impl Error {
    /// Returns true for internal invariant violations.
    pub fn is_invariant(&self) -> bool {
        matches!(self, Error::Invariant(_))
    }

    /// Creates a column not found error.
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            column: column.into(),
        }
    }

    pub fn duplicate_column(column: impl Into<String>) -> Self {
        Error::DuplicateColumn {
            column: column.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: DataType, got: DataType) -> Self {
        Error::TypeMismatch { expected, got }
    }

    pub fn unrepresentable(column: impl Into<String>, dtype: DataType) -> Self {
        Error::Unrepresentable {
            column: column.into(),
            dtype,
        }
    }

    pub fn unknown_aggregate(name: impl Into<String>) -> Self {
        Error::UnknownAggregate { name: name.into() }
    }

    pub fn unknown_filter_op(name: impl Into<String>) -> Self {
        Error::UnknownFilterOp { name: name.into() }
    }

    pub fn unknown_sort_order(name: impl Into<String>) -> Self {
        Error::UnknownSortOrder { name: name.into() }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn unsupported_type(dtype: DataType) -> Self {
        Error::UnsupportedType { dtype }
    }

    pub fn context_not_found(name: impl Into<String>) -> Self {
        Error::ContextNotFound { name: name.into() }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Error::Fault {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = Error::type_mismatch(DataType::Int32, DataType::String);
        assert!(err.to_string().contains("Type mismatch"));

        let err = Error::unknown_aggregate("median-ish");
        assert!(err.to_string().contains("median-ish"));

        let err: Error = InvariantViolation::UnknownOp(9).into();
        assert!(err.to_string().contains("Unknown OP: 9"));
    }

    #[test]
    fn test_invariant_classification() {
        assert!(Error::from(InvariantViolation::NotInitialized).is_invariant());
        assert!(!Error::column_not_found("x").is_invariant());
        assert!(!Error::fault("boom").is_invariant());
    }
}
