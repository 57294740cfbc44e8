//! Rill Storage - state store and fragment queues for Rill.
//!
//! This crate provides:
//!
//! - `GState`: the primary-key-addressed master table of a gnode
//! - `Port`: FIFO queues of table fragments, and the `PortRole`s of the
//!   fixed output tables produced by each processing step
//!
//! # Example
//!
//! ```rust
//! use rill_core::{DataTable, DataType, Scalar, Schema};
//! use rill_storage::GState;
//!
//! let schema = Schema::from_pairs(&[("amount", DataType::Float64)]).unwrap();
//! let mut gstate = GState::new(&schema, DataType::Int32).unwrap();
//!
//! let mut row = DataTable::with_len(&schema, 1);
//! row.set_scalar("amount", 0, &Scalar::Float64(10.0)).unwrap();
//! gstate.upsert(&Scalar::Int32(1), &row, 0).unwrap();
//!
//! assert!(gstate.has_pkey(&Scalar::Int32(1)));
//! assert_eq!(gstate.read_cell(&Scalar::Int32(1), "amount").unwrap(), Scalar::Float64(10.0));
//! ```

#![no_std]

extern crate alloc;

pub mod gstate;
pub mod port;

pub use gstate::{GState, RLookup};
pub use port::{Port, PortRole};
