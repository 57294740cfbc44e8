//! Rill Engine - tables and views over the incremental pivot engine.
//!
//! A `Table` accepts row or columnar updates against a primary key and
//! keeps every registered `View` up to date without recomputation.
//!
//! # Core Components
//!
//! - `Table`: typed ingestion, deletes, clears, column promotion and
//!   computed columns
//! - `View`: pivoted, filtered and sorted read access with step deltas
//! - `EngineConfig`: path separator, row limit and the `FaultPolicy` that
//!   decides what an internal invariant violation does
//!
//! # Example
//!
//! ```rust
//! use rill_context::{AggSpec, Aggregate, ViewConfig};
//! use rill_core::{DataType, Scalar, Schema};
//! use rill_engine::{EngineConfig, Table};
//!
//! let schema = Schema::from_pairs(&[
//!     ("id", DataType::Int32),
//!     ("category", DataType::String),
//!     ("amount", DataType::Float64),
//! ])
//! .unwrap();
//! let mut table = Table::new(&schema, Some("id"), EngineConfig::new()).unwrap();
//! let view = table
//!     .view(
//!         &ViewConfig::new()
//!             .row_pivot("category")
//!             .column("amount")
//!             .aggregate(AggSpec::new("amount", Aggregate::Sum)),
//!     )
//!     .unwrap();
//!
//! table
//!     .update(&[
//!         vec![Scalar::Int32(1), Scalar::str("A"), Scalar::Float64(10.0)],
//!         vec![Scalar::Int32(2), Scalar::str("B"), Scalar::Float64(7.0)],
//!     ])
//!     .unwrap();
//!
//! // Total row, then A and B.
//! assert_eq!(view.num_rows().unwrap(), 3);
//! assert_eq!(view.get_data(0..1, 0..1).unwrap(), vec![Scalar::Float64(17.0)]);
//! ```

#![no_std]

extern crate alloc;

pub mod config;
pub mod table;
pub mod view;

pub use config::{EngineConfig, FaultPolicy};
pub use rill_incremental::{ComputedColumn, ComputedFunction, ProcessResult};
pub use table::Table;
pub use view::{View, ROW_PATH};
