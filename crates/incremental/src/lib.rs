//! Rill Incremental - the diff engine behind every Rill table.
//!
//! A `Gnode` owns the stored state of one table and turns queued update
//! batches into per-cell changes that registered contexts consume without
//! recomputing anything.
//!
//! # Core Concepts
//!
//! - `flatten`: collapses a batch to one row per primary key, composing
//!   insert/update/delete/clear ops
//! - `DiffJob` / `ColumnDiff`: the per-column diff producing `prev`,
//!   `current`, `delta` and `ValueTransition` codes
//! - `ComputedColumn`: columns derived from other columns of the same row,
//!   re-evaluated only where their inputs changed
//! - `ContextArena` / `ContextHandle`: registered contexts behind
//!   generation-checked handles
//!
//! With the `parallel` feature (on by default) the per-column diff runs on
//! the rayon pool once a table has enough columns.
//!
//! # Example
//!
//! ```rust
//! use rill_core::{DataTable, DataType, OpCode, Scalar, Schema, PSP_OP, PSP_PKEY};
//! use rill_incremental::{Gnode, GnodeOptions};
//!
//! let output = Schema::from_pairs(&[("amount", DataType::Float64)]).unwrap();
//! let input = output.to_input_schema(DataType::Int32).unwrap();
//! let mut gnode = Gnode::new(input, output, GnodeOptions::new()).unwrap();
//! gnode.init().unwrap();
//!
//! let mut batch = DataTable::with_len(gnode.input_schema(), 1);
//! batch.set_scalar(PSP_PKEY, 0, &Scalar::Int32(1)).unwrap();
//! batch.set_scalar(PSP_OP, 0, &Scalar::UInt8(OpCode::Insert.as_u8())).unwrap();
//! batch.set_scalar("amount", 0, &Scalar::Float64(10.0)).unwrap();
//! gnode.send(0, batch).unwrap();
//!
//! let result = gnode.process(0).unwrap();
//! assert!(result.should_notify);
//! assert_eq!(gnode.get_pkeys(), vec![Scalar::Int32(1)]);
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod arena;
pub mod computed;
pub mod diff;
pub mod flatten;
pub mod gnode;

pub use arena::{ContextArena, ContextHandle};
pub use computed::{ComputedColumn, ComputedFunction};
pub use diff::{delta_column, ColumnDiff, DiffJob, RowPlan};
pub use flatten::{flatten, Flattened};
pub use gnode::{Gnode, GnodeOptions, GnodeState, ProcessResult};
pub use rill_storage::PortRole;
