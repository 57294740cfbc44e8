//! Rill Core - columnar storage and type definitions for Rill.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - `DataType`: supported column types and the promotion lattice
//! - `Scalar`: a single nullable cell value
//! - `Column` / `DataTable`: typed, nullable columnar storage
//! - `Schema`: ordered column declarations, including the internal
//!   `psp_pkey` / `psp_op` columns of input fragments
//! - `OpCode` / `ValueTransition`: per-row operations and per-cell changes
//! - `Error`: configuration errors and internal invariant violations
//!
//! # Example
//!
//! ```rust
//! use rill_core::{DataTable, DataType, Scalar, Schema};
//!
//! let schema = Schema::from_pairs(&[
//!     ("id", DataType::Int32),
//!     ("amount", DataType::Float64),
//! ])
//! .unwrap();
//!
//! let mut table = DataTable::with_len(&schema, 1);
//! table.set_scalar("id", 0, &Scalar::Int32(1)).unwrap();
//! table.set_scalar("amount", 0, &Scalar::Float64(10.0)).unwrap();
//!
//! assert_eq!(table.get_row(0), vec![Scalar::Int32(1), Scalar::Float64(10.0)]);
//! ```

#![no_std]

extern crate alloc;

mod bitmap;
mod column;
mod error;
mod op;
mod scalar;
pub mod schema;
mod table;
mod transition;
mod types;
mod vocab;

pub use bitmap::Bitmap;
pub use column::{CellType, Column, ColumnData, ObjectCell, StrCell};
pub use error::{Error, InvariantViolation, Result};
pub use op::OpCode;
pub use scalar::{civil_from_days, days_from_civil, ObjectRef, Scalar};
pub use schema::{Schema, PSP_OKEY, PSP_OP, PSP_PKEY};
pub use table::DataTable;
pub use transition::{TransitionInputs, ValueTransition};
pub use types::DataType;
pub use vocab::Vocab;
