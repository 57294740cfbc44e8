//! Primary-key state store.
//!
//! `GState` holds the authoritative current state of a table: one master
//! row per live primary key. Slots are stable while a key is live; deleting
//! a key tombstones its slot, releases its string and object handles and
//! pushes the slot onto a free list for reuse.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use rill_core::{DataTable, DataType, InvariantViolation, Result, Scalar, Schema, PSP_PKEY};

/// Result of a primary-key lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RLookup {
    /// Whether the key has a live row.
    pub exists: bool,
    /// The slot of the live row; meaningless when `exists` is false.
    pub idx: usize,
}

/// Master state keyed by primary key.
#[derive(Clone, Debug)]
pub struct GState {
    table: DataTable,
    mapping: HashMap<Scalar, usize>,
    free: Vec<usize>,
    pkey_idx: usize,
    /// String handles were released since the last `collect_vocab`.
    released: bool,
    /// The last collection ran; one more catches handles that were still
    /// held elsewhere at the time.
    settling: bool,
}

impl GState {
    /// Creates an empty store with the columns of `schema` plus `psp_pkey`.
    pub fn new(schema: &Schema, pkey_dtype: DataType) -> Result<Self> {
        let mut master = schema.without_internal();
        master.add_column(PSP_PKEY, pkey_dtype)?;
        let pkey_idx = master.len() - 1;
        Ok(Self {
            table: DataTable::new(&master),
            mapping: HashMap::new(),
            free: Vec::new(),
            pkey_idx,
            released: false,
            settling: false,
        })
    }

    /// Schema of the master table, including `psp_pkey`.
    pub fn schema(&self) -> &Schema {
        self.table.schema()
    }

    /// The raw master table, tombstoned slots included.
    pub fn master(&self) -> &DataTable {
        &self.table
    }

    /// Number of live rows.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.mapping.len()
    }

    /// Number of allocated slots, live or free.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.size()
    }

    pub fn lookup(&self, pkey: &Scalar) -> RLookup {
        match self.mapping.get(pkey) {
            Some(&idx) => RLookup { exists: true, idx },
            None => RLookup {
                exists: false,
                idx: 0,
            },
        }
    }

    #[inline]
    pub fn slot_of(&self, pkey: &Scalar) -> Option<usize> {
        self.mapping.get(pkey).copied()
    }

    pub fn has_pkey(&self, pkey: &Scalar) -> bool {
        self.mapping.contains_key(pkey)
    }

    pub fn has_pkeys(&self, pkeys: &[Scalar]) -> Vec<bool> {
        pkeys.iter().map(|k| self.has_pkey(k)).collect()
    }

    /// Writes row `row` of `src` as the image of `pkey`.
    ///
    /// Columns are matched by name; every master column other than
    /// `psp_pkey` must be present in `src` with its stored type, else the
    /// store is left untouched and an invariant violation is returned.
    /// Returns the slot written.
    pub fn upsert(&mut self, pkey: &Scalar, src: &DataTable, row: usize) -> Result<usize> {
        self.check_source(src)?;
        let slot = match self.mapping.get(pkey) {
            Some(&slot) => {
                self.released = true;
                slot
            }
            None => self.allocate(pkey.clone()),
        };
        for idx in 0..self.table.num_columns() {
            if idx == self.pkey_idx {
                continue;
            }
            let from = src.get_column(&self.table.schema().names()[idx])?;
            self.table.column_at_mut(idx).copy_cell_from(slot, from, row)?;
        }
        self.table
            .column_at_mut(self.pkey_idx)
            .set_scalar(slot, pkey)?;
        Ok(slot)
    }

    /// Checks that `src` carries every master column with its stored type.
    pub fn check_source(&self, src: &DataTable) -> Result<()> {
        for (idx, name) in self.table.schema().names().iter().enumerate() {
            if idx == self.pkey_idx {
                continue;
            }
            let expected = self.table.column_at(idx).dtype();
            let from = src.get_column(name).map_err(|_| InvariantViolation::SchemaMismatch {
                expected: format!("{}", self.table.schema()),
                got: format!("{}", src.schema()),
            })?;
            if from.dtype() != expected {
                return Err(InvariantViolation::DtypeMismatch {
                    column: String::from(name.as_str()),
                    expected,
                    got: from.dtype(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn allocate(&mut self, pkey: Scalar) -> usize {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.table.extend(1);
                self.table.size() - 1
            }
        };
        self.mapping.insert(pkey, slot);
        slot
    }

    /// Removes `pkey`, clearing its slot. Returns the freed slot.
    pub fn tombstone(&mut self, pkey: &Scalar) -> Option<usize> {
        let slot = self.mapping.remove(pkey)?;
        for column in self.table.columns_mut() {
            column.clear_cell(slot);
        }
        self.free.push(slot);
        self.released = true;
        Some(slot)
    }

    /// Drops vocabulary entries no stored cell references anymore, if any
    /// handle was released since the call before last. Returns the number
    /// of entries removed.
    pub fn collect_vocab(&mut self) -> usize {
        if !self.released && !self.settling {
            return 0;
        }
        self.settling = core::mem::replace(&mut self.released, false);
        self.table
            .columns_mut()
            .iter_mut()
            .map(|column| column.collect_vocab())
            .sum()
    }

    /// Live slots in ascending order.
    pub fn live_slots(&self) -> Vec<usize> {
        let mut slots: Vec<usize> = self.mapping.values().copied().collect();
        slots.sort_unstable();
        slots
    }

    /// The live rows in slot order.
    pub fn snapshot(&self) -> DataTable {
        self.table.select_rows(&self.live_slots())
    }

    /// Live primary keys in slot order.
    pub fn get_pkeys(&self) -> Vec<Scalar> {
        let pkeys = self.table.column_at(self.pkey_idx);
        self.live_slots()
            .into_iter()
            .map(|slot| pkeys.get_scalar(slot))
            .collect()
    }

    /// Reads the current value of `column` for `pkey`; Null when the key is
    /// absent.
    pub fn read_cell(&self, pkey: &Scalar, column: &str) -> Result<Scalar> {
        let column = self.table.get_column(column)?;
        Ok(match self.mapping.get(pkey) {
            Some(&slot) => column.get_scalar(slot),
            None => Scalar::Null,
        })
    }

    /// Reads a cell by slot.
    pub fn read_slot(&self, slot: usize, column: &str) -> Result<Scalar> {
        Ok(self.table.get_column(column)?.get_scalar(slot))
    }

    /// Overwrites one cell of a live slot.
    pub fn set_slot(&mut self, slot: usize, column: &str, value: &Scalar) -> Result<()> {
        self.table.set_scalar(column, slot, value)
    }

    /// Adds a column (e.g. a computed column) with every slot invalid.
    pub fn add_column(&mut self, name: &str, dtype: DataType) -> Result<()> {
        self.table.add_column(name, dtype, false)?;
        Ok(())
    }

    /// Rewrites a column as `dtype`, converting every stored value.
    pub fn promote_column(&mut self, name: &str, dtype: DataType) -> Result<()> {
        let size = self.table.size();
        self.table.promote_column(name, dtype, size, false)
    }

    /// Drops every row and slot, keeping the schema.
    pub fn reset(&mut self) {
        self.table.clear();
        self.mapping.clear();
        self.free.clear();
        self.released = true;
        self.collect_vocab();
    }
}
