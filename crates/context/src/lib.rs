//! Rill Context - incrementally maintained aggregation contexts.
//!
//! A context consumes the tables produced by each processing step of a
//! gnode and keeps a queryable view up to date without recomputation:
//!
//! - `Ctx0`: a filtered, sorted list of primary keys
//! - `Ctx1`: a sparse tree of aggregates keyed by row-pivot path
//! - `Ctx2`: row and column trees crossed into aggregate cells
//!
//! `Context` wraps the three behind one notify/read contract.
//!
//! # Example
//!
//! ```rust
//! use rill_context::{AggSpec, Aggregate, Context, ViewConfig};
//! use rill_core::{DataTable, DataType, Scalar, Schema, PSP_PKEY};
//!
//! let mut master = Schema::from_pairs(&[
//!     ("category", DataType::String),
//!     ("amount", DataType::Float64),
//! ])
//! .unwrap();
//! master.add_column(PSP_PKEY, DataType::Int32).unwrap();
//!
//! let mut snapshot = DataTable::with_len(&master, 2);
//! for (row, (cat, amount)) in [("A", 10.0), ("A", 5.0)].into_iter().enumerate() {
//!     snapshot.set_scalar("category", row, &Scalar::str(cat)).unwrap();
//!     snapshot.set_scalar("amount", row, &Scalar::Float64(amount)).unwrap();
//!     snapshot.set_scalar(PSP_PKEY, row, &Scalar::Int32(row as i32)).unwrap();
//! }
//!
//! let config = ViewConfig::new()
//!     .row_pivot("category")
//!     .aggregate(AggSpec::new("amount", Aggregate::Sum));
//! let mut ctx = Context::new(&config, &master).unwrap();
//! ctx.notify_initial(&snapshot).unwrap();
//!
//! // Total row, then "A".
//! assert_eq!(ctx.get_row_count(), 2);
//! assert_eq!(ctx.unity_get_row_path(1), vec![Scalar::str("A")]);
//! ```

#![no_std]

extern crate alloc;

pub mod aggregate;
pub mod config;
mod context;
pub mod ctx0;
pub mod ctx1;
pub mod ctx2;
pub mod delta;
pub mod expand;
pub mod filter;
pub mod notify;
pub mod sort;
pub mod tree;

#[cfg(test)]
mod testing;

pub use aggregate::{AggState, Aggregate};
pub use config::{AggSpec, ResolvedAgg, ResolvedConfig, ViewConfig};
pub use context::{Axis, Context};
pub use ctx0::Ctx0;
pub use ctx1::Ctx1;
pub use ctx2::Ctx2;
pub use delta::{CellUpdate, RowDelta, StepDelta};
pub use filter::{Combinator, Filter, FilterOp, FilterTerm};
pub use notify::{NotifyTables, PSP_EXISTED};
pub use sort::{SortOrder, SortSpec};
