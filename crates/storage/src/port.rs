//! Fragment queues.
//!
//! A `Port` buffers table fragments in arrival order until the owning gnode
//! drains them. Order is load-bearing: the last write for a key wins, so
//! fragments are never deduplicated or reordered.

use alloc::collections::VecDeque;
use alloc::format;
use rill_core::{DataTable, DataType, InvariantViolation, Result, Schema};

/// Role of a fixed output table produced by one processing step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortRole {
    /// One row per key touched, with the resolved op codes.
    Flattened,
    /// `current - prev` for numeric columns.
    Delta,
    /// Values before the batch.
    Prev,
    /// Values after the batch.
    Current,
    /// Per-cell `ValueTransition` codes.
    Transitions,
    /// Whether the row ever materialized.
    Existed,
}

impl PortRole {
    pub const ALL: [PortRole; 6] = [
        PortRole::Flattened,
        PortRole::Delta,
        PortRole::Prev,
        PortRole::Current,
        PortRole::Transitions,
        PortRole::Existed,
    ];
}

/// FIFO queue of fragments sharing one schema.
#[derive(Clone, Debug)]
pub struct Port {
    schema: Schema,
    fragments: VecDeque<DataTable>,
}

impl Port {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            fragments: VecDeque::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Queues a fragment. Its schema must equal the port schema exactly.
    pub fn push(&mut self, fragment: DataTable) -> Result<()> {
        if fragment.schema() != &self.schema {
            return Err(InvariantViolation::SchemaMismatch {
                expected: format!("{}", self.schema),
                got: format!("{}", fragment.schema()),
            }
            .into());
        }
        self.fragments.push_back(fragment);
        Ok(())
    }

    /// Removes and concatenates every queued fragment, in arrival order.
    pub fn drain(&mut self) -> Result<DataTable> {
        let mut out = DataTable::new(&self.schema);
        while let Some(fragment) = self.fragments.pop_front() {
            out.append(&fragment)?;
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn num_fragments(&self) -> usize {
        self.fragments.len()
    }

    /// Total number of queued rows.
    pub fn num_rows(&self) -> usize {
        self.fragments.iter().map(DataTable::size).sum()
    }

    /// Re-types a column of the port and of every queued fragment.
    pub fn promote_column(&mut self, name: &str, dtype: DataType) -> Result<()> {
        self.schema.retype(name, dtype)?;
        for fragment in self.fragments.iter_mut() {
            let size = fragment.size();
            fragment.promote_column(name, dtype, size, false)?;
        }
        Ok(())
    }

    /// Drops every queued fragment.
    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}
