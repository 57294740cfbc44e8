//! Per-column diff of a flattened batch against the stored state.
//!
//! Each master column is diffed independently into four row-aligned
//! columns: `prev` (the stored cell), `current` (the incoming cell, or the
//! stored one when the incoming cell is invalid), the `ValueTransition`
//! code and the numeric delta `current - prev`, with invalid cells counted
//! as zero. Columns share no state, which is what lets the gnode spread them
//! over a thread pool.

use alloc::string::String;
use alloc::vec::Vec;
use rill_core::{
    with_cell_type, Bitmap, CellType, Column, DataType, InvariantViolation, OpCode, Result,
    TransitionInputs, ValueTransition,
};

/// Per-row inputs shared by every column of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowPlan {
    pub op: OpCode,
    /// The key had a live stored row before the batch.
    pub pre_existed: bool,
    /// Stored slot of the key; meaningless when `pre_existed` is false.
    pub slot: usize,
    /// The row image was replaced within the batch.
    pub reset: bool,
}

impl RowPlan {
    /// Whether the row exists once the batch is committed.
    #[inline]
    pub fn exists_after(&self) -> bool {
        self.op != OpCode::Delete
    }

    /// False only for a delete of a key that never materialized.
    #[inline]
    pub fn existed(&self) -> bool {
        self.pre_existed || self.op != OpCode::Delete
    }
}

/// The diff of one column.
#[derive(Clone, Debug)]
pub struct ColumnDiff {
    pub prev: Column,
    pub current: Column,
    pub delta: Column,
    /// `ValueTransition` codes as `UInt8`.
    pub transitions: Column,
}

impl ColumnDiff {
    /// Whether any row of this column changed.
    pub fn any_change(&self) -> bool {
        self.transitions
            .values::<u8>()
            .map(|codes| codes.iter().any(|&code| is_change(code)))
            .unwrap_or(false)
    }
}

/// Returns whether a transition code is anything but a no-op.
#[inline]
pub(crate) fn is_change(code: u8) -> bool {
    ValueTransition::from_u8(code).map_or(false, |t| !t.is_noop())
}

/// One column to diff.
#[derive(Clone, Copy, Debug)]
pub struct DiffJob<'a> {
    pub name: &'a str,
    /// The stored master column, indexed by slot.
    pub stored: &'a Column,
    /// Incoming cells, row-aligned with the plan.
    pub incoming: &'a Column,
    /// Rows whose incoming cell is authoritative: an invalid cell there
    /// does not fall back to the stored one.
    pub authoritative: Option<&'a [bool]>,
}

impl<'a> DiffJob<'a> {
    pub fn run(&self, plan: &[RowPlan]) -> Result<ColumnDiff> {
        let dtype = self.stored.dtype();
        if self.incoming.dtype() != dtype {
            return Err(self.mismatch(self.incoming.dtype()).into());
        }
        if self.incoming.len() != plan.len() {
            return Err(InvariantViolation::LengthMismatch {
                expected: plan.len(),
                got: self.incoming.len(),
            }
            .into());
        }
        let (prev, current, codes) = with_cell_type!(dtype, T => self.diff_cells::<T>(plan)?);
        let delta = delta_column(&prev, &current);
        log::trace!("diffed column {} over {} rows", self.name, plan.len());
        Ok(ColumnDiff {
            prev,
            current,
            delta,
            transitions: code_column(codes),
        })
    }

    fn mismatch(&self, got: DataType) -> InvariantViolation {
        InvariantViolation::DtypeMismatch {
            column: String::from(self.name),
            expected: self.stored.dtype(),
            got,
        }
    }

    fn diff_cells<T: CellType>(&self, plan: &[RowPlan]) -> Result<(Column, Column, Vec<u8>)> {
        let dtype = self.stored.dtype();
        let n = plan.len();
        let stored = self
            .stored
            .values::<T>()
            .ok_or_else(|| self.mismatch(dtype))?;
        let fresh = self
            .incoming
            .values::<T>()
            .ok_or_else(|| self.mismatch(self.incoming.dtype()))?;

        let mut prev = Column::with_len(dtype, n);
        let mut current = Column::with_len(dtype, n);
        let mut codes = Vec::with_capacity(n);
        {
            let (prev_cells, prev_valid) = prev
                .values_mut::<T>()
                .ok_or_else(|| self.mismatch(dtype))?;
            let (cur_cells, cur_valid) = current
                .values_mut::<T>()
                .ok_or_else(|| self.mismatch(dtype))?;

            for (i, row) in plan.iter().enumerate() {
                let had = row.pre_existed && self.stored.is_valid(row.slot);
                if had {
                    prev_cells[i] = stored[row.slot].clone();
                    prev_valid.set(i, true);
                }

                let transition = match row.op {
                    OpCode::Delete if row.pre_existed => ValueTransition::Deleted,
                    OpCode::Delete => ValueTransition::NullToNull,
                    OpCode::Insert | OpCode::Update => {
                        let authoritative = row.reset
                            || self.authoritative.map_or(false, |rows| rows[i]);
                        let has = if self.incoming.is_valid(i) {
                            cur_cells[i] = fresh[i].clone();
                            true
                        } else if had && !authoritative {
                            cur_cells[i] = prev_cells[i].clone();
                            true
                        } else {
                            false
                        };
                        cur_valid.set(i, has);
                        TransitionInputs {
                            row_pre_existed: row.pre_existed,
                            prev_valid: had,
                            cur_valid: has,
                            prev_cur_eq: had && has && prev_cells[i].cell_eq(&cur_cells[i]),
                            reset: row.reset,
                        }
                        .classify()
                    }
                    OpCode::Clear => {
                        return Err(InvariantViolation::UnknownOp(OpCode::Clear.as_u8()).into())
                    }
                };
                codes.push(transition.as_u8());
            }
        }
        Ok((prev, current, codes))
    }
}

/// Numeric cells and the type their difference is stored as.
trait DeltaCell: CellType + Copy {
    type Delta: CellType + Copy;

    /// `None` when the difference does not fit `Delta`.
    fn delta(current: Self, prev: Self) -> Option<Self::Delta>;
}

macro_rules! impl_int_delta {
    ($($t:ty),+ $(,)?) => {
        $(impl DeltaCell for $t {
            type Delta = i64;

            #[inline]
            fn delta(current: Self, prev: Self) -> Option<i64> {
                i64::try_from(current as i128 - prev as i128).ok()
            }
        })+
    };
}

impl_int_delta!(i8, i16, i32, i64, u8, u16, u32, u64);

impl DeltaCell for f32 {
    type Delta = f32;

    #[inline]
    fn delta(current: Self, prev: Self) -> Option<f32> {
        Some(current - prev)
    }
}

impl DeltaCell for f64 {
    type Delta = f64;

    #[inline]
    fn delta(current: Self, prev: Self) -> Option<f64> {
        Some(current - prev)
    }
}

/// Cells whose difference overflows stay invalid; contexts then retract
/// and re-add instead of shifting.
fn delta_cells<T: DeltaCell>(prev: &Column, current: &Column) -> Column {
    let n = prev.len();
    let mut out = Column::with_len(prev.dtype().delta_type(), n);
    let (Some(p), Some(c)) = (prev.values::<T>(), current.values::<T>()) else {
        return out;
    };
    if let Some((cells, valid)) = out.values_mut::<T::Delta>() {
        for i in 0..n {
            let cur = if current.is_valid(i) { c[i] } else { T::default() };
            let old = if prev.is_valid(i) { p[i] } else { T::default() };
            if let Some(delta) = T::delta(cur, old) {
                cells[i] = delta;
                valid.set(i, true);
            }
        }
    }
    out
}

/// `current - prev` for numeric columns; an all-invalid column otherwise.
pub fn delta_column(prev: &Column, current: &Column) -> Column {
    match prev.dtype() {
        DataType::Int8 => delta_cells::<i8>(prev, current),
        DataType::Int16 => delta_cells::<i16>(prev, current),
        DataType::Int32 => delta_cells::<i32>(prev, current),
        DataType::Int64 => delta_cells::<i64>(prev, current),
        DataType::UInt8 => delta_cells::<u8>(prev, current),
        DataType::UInt16 => delta_cells::<u16>(prev, current),
        DataType::UInt32 => delta_cells::<u32>(prev, current),
        DataType::UInt64 => delta_cells::<u64>(prev, current),
        DataType::Float32 => delta_cells::<f32>(prev, current),
        DataType::Float64 => delta_cells::<f64>(prev, current),
        other => Column::with_len(other.delta_type(), prev.len()),
    }
}

/// A fully valid column built from native cells.
pub(crate) fn dense_column<T: CellType>(dtype: DataType, cells: Vec<T>) -> Column {
    let mut column = Column::with_len(dtype, cells.len());
    if let Some((dst, valid)) = column.values_mut::<T>() {
        for (i, cell) in cells.into_iter().enumerate() {
            dst[i] = cell;
        }
        *valid = Bitmap::with_len(dst.len(), true);
    }
    column
}

fn code_column(codes: Vec<u8>) -> Column {
    dense_column(DataType::UInt8, codes)
}

/// Diffs every job, spreading them over the rayon pool once there are at
/// least `threshold` of them.
#[cfg(feature = "parallel")]
pub fn diff_all(jobs: &[DiffJob<'_>], plan: &[RowPlan], threshold: usize) -> Result<Vec<ColumnDiff>> {
    use rayon::prelude::*;

    if jobs.len() >= threshold {
        jobs.par_iter().map(|job| job.run(plan)).collect()
    } else {
        jobs.iter().map(|job| job.run(plan)).collect()
    }
}

/// Diffs every job in order.
#[cfg(not(feature = "parallel"))]
pub fn diff_all(jobs: &[DiffJob<'_>], plan: &[RowPlan], _threshold: usize) -> Result<Vec<ColumnDiff>> {
    jobs.iter().map(|job| job.run(plan)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use rill_core::Scalar;

    fn plan(op: OpCode, slot: Option<usize>, reset: bool) -> RowPlan {
        RowPlan {
            op,
            pre_existed: slot.is_some(),
            slot: slot.unwrap_or(0),
            reset,
        }
    }

    fn column(dtype: DataType, values: &[Scalar]) -> Column {
        Column::from_scalars(dtype, values).unwrap()
    }

    fn codes(diff: &ColumnDiff) -> Vec<ValueTransition> {
        diff.transitions
            .values::<u8>()
            .unwrap()
            .iter()
            .map(|&c| ValueTransition::from_u8(c).unwrap())
            .collect()
    }

    #[test]
    fn test_numeric_transitions_and_deltas() {
        let stored = column(
            DataType::Float64,
            &[Scalar::Float64(10.0), Scalar::Float64(4.0), Scalar::Float64(7.0)],
        );
        let incoming = column(
            DataType::Float64,
            &[Scalar::Float64(12.0), Scalar::Null, Scalar::Null, Scalar::Float64(3.0)],
        );
        let rows = [
            plan(OpCode::Update, Some(0), false),
            plan(OpCode::Update, Some(1), false),
            plan(OpCode::Delete, Some(2), false),
            plan(OpCode::Insert, None, false),
        ];
        let job = DiffJob {
            name: "amount",
            stored: &stored,
            incoming: &incoming,
            authoritative: None,
        };
        let diff = job.run(&rows).unwrap();

        assert_eq!(
            codes(&diff),
            vec![
                ValueTransition::Changed,
                ValueTransition::Unchanged,
                ValueTransition::Deleted,
                ValueTransition::Appeared,
            ]
        );
        // The invalid incoming cell falls back to the stored value.
        assert_eq!(diff.current.get_scalar(1), Scalar::Float64(4.0));
        assert!(!diff.current.is_valid(2));
        assert!(!diff.prev.is_valid(3));
        assert_eq!(diff.delta.values::<f64>().unwrap(), &[2.0, 0.0, -7.0, 3.0]);
        assert!(diff.any_change());
    }

    #[test]
    fn test_reset_rows_do_not_fall_back() {
        let stored = column(DataType::Int32, &[Scalar::Int32(5)]);
        let incoming = column(DataType::Int32, &[Scalar::Null]);
        let job = DiffJob {
            name: "qty",
            stored: &stored,
            incoming: &incoming,
            authoritative: None,
        };
        let diff = job.run(&[plan(OpCode::Insert, Some(0), true)]).unwrap();
        assert_eq!(codes(&diff), vec![ValueTransition::Vanished]);
        assert!(!diff.current.is_valid(0));
        assert_eq!(diff.delta.values::<i64>().unwrap(), &[-5]);
    }

    #[test]
    fn test_unsigned_delta_widens() {
        let stored = column(DataType::UInt8, &[Scalar::UInt8(200)]);
        let incoming = column(DataType::UInt8, &[Scalar::UInt8(10)]);
        let job = DiffJob {
            name: "level",
            stored: &stored,
            incoming: &incoming,
            authoritative: None,
        };
        let diff = job.run(&[plan(OpCode::Update, Some(0), false)]).unwrap();
        assert_eq!(diff.delta.dtype(), DataType::Int64);
        assert_eq!(diff.delta.values::<i64>().unwrap(), &[-190]);
    }

    #[test]
    fn test_narrow_integer_deltas_do_not_wrap() {
        let stored = column(DataType::Int8, &[Scalar::Int8(100), Scalar::Int8(i8::MIN)]);
        let incoming = column(DataType::Int8, &[Scalar::Int8(-100), Scalar::Int8(i8::MAX)]);
        let job = DiffJob {
            name: "qty",
            stored: &stored,
            incoming: &incoming,
            authoritative: None,
        };
        let rows = [
            plan(OpCode::Update, Some(0), false),
            plan(OpCode::Update, Some(1), false),
        ];
        let diff = job.run(&rows).unwrap();
        assert_eq!(diff.delta.dtype(), DataType::Int64);
        assert_eq!(diff.delta.values::<i64>().unwrap(), &[-200, 255]);
    }

    #[test]
    fn test_overflowing_delta_is_invalid() {
        let stored = column(DataType::Int64, &[Scalar::Int64(i64::MIN), Scalar::Int64(1)]);
        let incoming = column(DataType::Int64, &[Scalar::Int64(i64::MAX), Scalar::Int64(3)]);
        let job = DiffJob {
            name: "big",
            stored: &stored,
            incoming: &incoming,
            authoritative: None,
        };
        let rows = [
            plan(OpCode::Update, Some(0), false),
            plan(OpCode::Update, Some(1), false),
        ];
        let diff = job.run(&rows).unwrap();
        assert_eq!(codes(&diff), vec![ValueTransition::Changed, ValueTransition::Changed]);
        assert!(!diff.delta.is_valid(0));
        assert_eq!(diff.delta.get_scalar(1), Scalar::Int64(2));
    }

    #[test]
    fn test_strings_have_no_delta() {
        let stored = column(DataType::String, &[Scalar::str("a")]);
        let incoming = column(DataType::String, &[Scalar::str("b")]);
        let job = DiffJob {
            name: "name",
            stored: &stored,
            incoming: &incoming,
            authoritative: None,
        };
        let diff = job.run(&[plan(OpCode::Update, Some(0), false)]).unwrap();
        assert_eq!(codes(&diff), vec![ValueTransition::Changed]);
        assert!(!diff.delta.is_valid(0));
    }

    #[test]
    fn test_dtype_mismatch_is_invariant() {
        let stored = column(DataType::Int32, &[Scalar::Int32(1)]);
        let incoming = column(DataType::Float64, &[Scalar::Float64(1.0)]);
        let job = DiffJob {
            name: "qty",
            stored: &stored,
            incoming: &incoming,
            authoritative: None,
        };
        let err = job
            .run(&[plan(OpCode::Update, Some(0), false)])
            .unwrap_err();
        assert!(err.is_invariant());
    }

    #[test]
    fn test_diff_all_keeps_job_order() {
        let a = column(DataType::Int32, &[Scalar::Int32(1)]);
        let b = column(DataType::Int32, &[Scalar::Int32(2)]);
        let jobs: Vec<DiffJob<'_>> = [("a", &a), ("b", &b)]
            .into_iter()
            .map(|(name, col)| DiffJob {
                name,
                stored: col,
                incoming: col,
                authoritative: None,
            })
            .collect();
        let diffs = diff_all(&jobs, &[plan(OpCode::Update, Some(0), false)], 1).unwrap();
        assert_eq!(diffs[0].current.get_scalar(0), Scalar::Int32(1));
        assert_eq!(diffs[1].current.get_scalar(0), Scalar::Int32(2));
        assert!(!diffs[0].any_change());
    }
}
