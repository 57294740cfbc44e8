//! Columnar extraction and encoding of view windows.
//!
//! A view window is extracted as one `ColumnBuffer` per column: typed
//! values, a null count and an LSB-first validity bitmap, which is the
//! shape every columnar interchange format expects. `BatchEncoder` packs a
//! `ColumnarBatch` into a single buffer.
//!
//! ## Binary Format (Column-Major)
//!
//! ```text
//! Header: 16 bytes
//! +----------+-------------+------------+-------+
//! | row_count| column_count| var_offset | flags |
//! | u32      | u32         | u32        | u32   |
//! +----------+-------------+------------+-------+
//!
//! Column descriptors, one per column:
//! [type_id: u8][name_len: u16][name bytes]
//!
//! Fixed section, one block per column:
//! [validity: ceil(rows/8) bytes][value 0][value 1]...
//!
//! Variable Section:
//! [string bytes]
//! ```

#![no_std]

extern crate alloc;

mod batch;
mod encoder;
mod layout;

pub use batch::{ColumnBuffer, ColumnarBatch};
pub use encoder::{BatchEncoder, Header};
pub use layout::{BatchLayout, BinaryDataType, ColumnLayout};

/// Header size in bytes
pub const HEADER_SIZE: usize = 16;

/// Header flags
pub mod flags {
    pub const HAS_NULLS: u32 = 1 << 0;
}
