//! Packs a `ColumnarBatch` into one little-endian buffer.

use crate::batch::{ColumnBuffer, ColumnarBatch};
use crate::layout::BatchLayout;
use crate::{flags, HEADER_SIZE};
use alloc::vec::Vec;
use rill_core::{ColumnData, Error, Result};

/// Decoded header of an encoded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub row_count: u32,
    pub column_count: u32,
    /// Byte offset of the variable section
    pub var_offset: u32,
    pub flags: u32,
}

impl Header {
    /// Reads the header at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::invalid_operation("buffer shorter than header"));
        }
        let word = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Ok(Self {
            row_count: word(0),
            column_count: word(4),
            var_offset: word(8),
            flags: word(12),
        })
    }

    pub fn has_nulls(&self) -> bool {
        self.flags & flags::HAS_NULLS != 0
    }
}

/// Column-major batch encoder
pub struct BatchEncoder {
    buffer: Vec<u8>,
    var_buffer: Vec<u8>,
}

impl BatchEncoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            var_buffer: Vec::new(),
        }
    }

    /// Encodes `batch`. String cells are written as `(offset, len)` into the
    /// variable section, which follows the fixed section.
    pub fn encode(mut self, batch: &ColumnarBatch) -> Result<Vec<u8>> {
        let rows = batch.num_rows();
        let pairs: Vec<_> = batch.columns().iter().map(|c| (c.name(), c.dtype())).collect();
        let layout = BatchLayout::new(&pairs)?;

        self.buffer.reserve(HEADER_SIZE + layout.fixed_section_size(rows));
        self.buffer.resize(HEADER_SIZE, 0);

        for col in layout.columns() {
            let name = col.name.as_bytes();
            let name_len = u16::try_from(name.len())
                .map_err(|_| Error::invalid_operation("column name too long"))?;
            self.buffer.push(col.data_type as u8);
            self.buffer.extend_from_slice(&name_len.to_le_bytes());
            self.buffer.extend_from_slice(name);
        }

        for column in batch.columns() {
            self.buffer.extend_from_slice(&column.validity_bytes());
            self.encode_values(column)?;
        }

        let var_offset = header_u32(self.buffer.len(), "encoded batch exceeds 4 GiB")?;
        let row_count = header_u32(rows, "row count exceeds u32")?;
        let column_count = header_u32(batch.num_columns(), "column count exceeds u32")?;
        let header_flags = if batch.has_nulls() { flags::HAS_NULLS } else { 0 };
        self.write_header(row_count, column_count, var_offset, header_flags);

        self.buffer.extend_from_slice(&self.var_buffer);
        log::trace!(
            "encoded {} rows x {} columns into {} bytes",
            rows,
            batch.num_columns(),
            self.buffer.len()
        );
        Ok(self.buffer)
    }

    fn encode_values(&mut self, column: &ColumnBuffer) -> Result<()> {
        macro_rules! le {
            ($v:expr) => {
                for x in $v.iter() {
                    self.buffer.extend_from_slice(&x.to_le_bytes());
                }
            };
        }
        match column.data() {
            ColumnData::Bool(v) => self.buffer.extend(v.iter().map(|b| *b as u8)),
            ColumnData::Int8(v) => le!(v),
            ColumnData::Int16(v) => le!(v),
            ColumnData::Int32(v) | ColumnData::Date(v) => le!(v),
            ColumnData::Int64(v) | ColumnData::DateTime(v) => le!(v),
            ColumnData::UInt8(v) => self.buffer.extend_from_slice(v),
            ColumnData::UInt16(v) => le!(v),
            ColumnData::UInt32(v) => le!(v),
            ColumnData::UInt64(v) => le!(v),
            ColumnData::Float32(v) => le!(v),
            ColumnData::Float64(v) => le!(v),
            ColumnData::Str(v) => {
                for cell in v {
                    match cell {
                        Some(s) => self.write_varlen(s.as_bytes())?,
                        None => self.buffer.extend_from_slice(&[0; 8]),
                    }
                }
            }
            ColumnData::Object(_) => return Err(Error::unsupported_type(column.dtype())),
        }
        Ok(())
    }

    fn write_varlen(&mut self, bytes: &[u8]) -> Result<()> {
        let offset = header_u32(self.var_buffer.len(), "variable section exceeds 4 GiB")?;
        let len = header_u32(bytes.len(), "string cell exceeds 4 GiB")?;
        self.buffer.extend_from_slice(&offset.to_le_bytes());
        self.buffer.extend_from_slice(&len.to_le_bytes());
        self.var_buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn write_header(&mut self, rows: u32, columns: u32, var_offset: u32, header_flags: u32) {
        self.buffer[0..4].copy_from_slice(&rows.to_le_bytes());
        self.buffer[4..8].copy_from_slice(&columns.to_le_bytes());
        self.buffer[8..12].copy_from_slice(&var_offset.to_le_bytes());
        self.buffer[12..16].copy_from_slice(&header_flags.to_le_bytes());
    }
}

/// Header and descriptor fields are `u32`; anything wider is refused.
fn header_u32(value: usize, message: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::invalid_operation(message))
}

impl Default for BatchEncoder {
    fn default() -> Self {
        Self::new()
    }
}
