//! Typed, nullable columnar storage.
//!
//! A `Column` stores one `Vec` of native cells per data type plus a validity
//! `Bitmap` of the same length. String and object cells are reference
//! counted handles: replacing or invalidating a cell drops the handle, which
//! is the only bookkeeping their lifetime needs.

use crate::bitmap::Bitmap;
use crate::error::{Error, InvariantViolation, Result};
use crate::scalar::{ObjectRef, Scalar};
use crate::types::DataType;
use crate::vocab::Vocab;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

/// Cell type of string columns.
pub type StrCell = Option<Arc<str>>;
/// Cell type of object columns.
pub type ObjectCell = Option<ObjectRef>;

/// Native storage of a column.
#[derive(Clone, Debug)]
pub enum ColumnData {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Str(Vec<StrCell>),
    Date(Vec<i32>),
    DateTime(Vec<i64>),
    Object(Vec<ObjectCell>),
}

macro_rules! each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ColumnData::Bool($v) => $body,
            ColumnData::Int8($v) => $body,
            ColumnData::Int16($v) => $body,
            ColumnData::Int32($v) => $body,
            ColumnData::Int64($v) => $body,
            ColumnData::UInt8($v) => $body,
            ColumnData::UInt16($v) => $body,
            ColumnData::UInt32($v) => $body,
            ColumnData::UInt64($v) => $body,
            ColumnData::Float32($v) => $body,
            ColumnData::Float64($v) => $body,
            ColumnData::Str($v) => $body,
            ColumnData::Date($v) => $body,
            ColumnData::DateTime($v) => $body,
            ColumnData::Object($v) => $body,
        }
    };
}

macro_rules! map_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ColumnData::Bool($v) => ColumnData::Bool($body),
            ColumnData::Int8($v) => ColumnData::Int8($body),
            ColumnData::Int16($v) => ColumnData::Int16($body),
            ColumnData::Int32($v) => ColumnData::Int32($body),
            ColumnData::Int64($v) => ColumnData::Int64($body),
            ColumnData::UInt8($v) => ColumnData::UInt8($body),
            ColumnData::UInt16($v) => ColumnData::UInt16($body),
            ColumnData::UInt32($v) => ColumnData::UInt32($body),
            ColumnData::UInt64($v) => ColumnData::UInt64($body),
            ColumnData::Float32($v) => ColumnData::Float32($body),
            ColumnData::Float64($v) => ColumnData::Float64($body),
            ColumnData::Str($v) => ColumnData::Str($body),
            ColumnData::Date($v) => ColumnData::Date($body),
            ColumnData::DateTime($v) => ColumnData::DateTime($body),
            ColumnData::Object($v) => ColumnData::Object($body),
        }
    };
}

/// Runs `$body` with `$T` bound to the native cell type of `$dtype`.
#[macro_export]
macro_rules! with_cell_type {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::DataType::Bool => {
                type $T = bool;
                $body
            }
            $crate::DataType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::DataType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::DataType::Int32 | $crate::DataType::Date => {
                type $T = i32;
                $body
            }
            $crate::DataType::Int64 | $crate::DataType::DateTime => {
                type $T = i64;
                $body
            }
            $crate::DataType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::DataType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::DataType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::DataType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::DataType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::DataType::Float64 => {
                type $T = f64;
                $body
            }
            $crate::DataType::String => {
                type $T = $crate::StrCell;
                $body
            }
            $crate::DataType::Object => {
                type $T = $crate::ObjectCell;
                $body
            }
        }
    };
}

impl ColumnData {
    /// Allocates `len` default cells for `dtype`.
    pub fn new(dtype: DataType, len: usize) -> Self {
        match dtype {
            DataType::Bool => ColumnData::Bool(vec![false; len]),
            DataType::Int8 => ColumnData::Int8(vec![0; len]),
            DataType::Int16 => ColumnData::Int16(vec![0; len]),
            DataType::Int32 => ColumnData::Int32(vec![0; len]),
            DataType::Int64 => ColumnData::Int64(vec![0; len]),
            DataType::UInt8 => ColumnData::UInt8(vec![0; len]),
            DataType::UInt16 => ColumnData::UInt16(vec![0; len]),
            DataType::UInt32 => ColumnData::UInt32(vec![0; len]),
            DataType::UInt64 => ColumnData::UInt64(vec![0; len]),
            DataType::Float32 => ColumnData::Float32(vec![0.0; len]),
            DataType::Float64 => ColumnData::Float64(vec![0.0; len]),
            DataType::String => ColumnData::Str(vec![None; len]),
            DataType::Date => ColumnData::Date(vec![0; len]),
            DataType::DateTime => ColumnData::DateTime(vec![0; len]),
            DataType::Object => ColumnData::Object(vec![None; len]),
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            ColumnData::Bool(_) => DataType::Bool,
            ColumnData::Int8(_) => DataType::Int8,
            ColumnData::Int16(_) => DataType::Int16,
            ColumnData::Int32(_) => DataType::Int32,
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::UInt8(_) => DataType::UInt8,
            ColumnData::UInt16(_) => DataType::UInt16,
            ColumnData::UInt32(_) => DataType::UInt32,
            ColumnData::UInt64(_) => DataType::UInt64,
            ColumnData::Float32(_) => DataType::Float32,
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::Str(_) => DataType::String,
            ColumnData::Date(_) => DataType::Date,
            ColumnData::DateTime(_) => DataType::DateTime,
            ColumnData::Object(_) => DataType::Object,
        }
    }

    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A native cell type that can be viewed as a typed slice of `ColumnData`.
pub trait CellType: Clone + Default + Send + Sync + 'static {
    /// Whether cells own a reference-counted payload.
    const HAS_PAYLOAD: bool = false;

    fn cells(data: &ColumnData) -> Option<&Vec<Self>>;

    fn cells_mut(data: &mut ColumnData) -> Option<&mut Vec<Self>>;

    /// Value equality used for transition classification.
    fn cell_eq(&self, other: &Self) -> bool;
}

macro_rules! impl_cell_type {
    ($t:ty, $($variant:ident)|+) => {
        impl CellType for $t {
            #[inline]
            fn cells(data: &ColumnData) -> Option<&Vec<Self>> {
                match data {
                    $(ColumnData::$variant(v) => Some(v),)+
                    _ => None,
                }
            }

            #[inline]
            fn cells_mut(data: &mut ColumnData) -> Option<&mut Vec<Self>> {
                match data {
                    $(ColumnData::$variant(v) => Some(v),)+
                    _ => None,
                }
            }

            #[inline]
            fn cell_eq(&self, other: &Self) -> bool {
                self == other
            }
        }
    };
}

impl_cell_type!(bool, Bool);
impl_cell_type!(i8, Int8);
impl_cell_type!(i16, Int16);
impl_cell_type!(i32, Int32 | Date);
impl_cell_type!(i64, Int64 | DateTime);
impl_cell_type!(u8, UInt8);
impl_cell_type!(u16, UInt16);
impl_cell_type!(u32, UInt32);
impl_cell_type!(u64, UInt64);

macro_rules! impl_float_cell_type {
    ($t:ty, $variant:ident) => {
        impl CellType for $t {
            #[inline]
            fn cells(data: &ColumnData) -> Option<&Vec<Self>> {
                match data {
                    ColumnData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            #[inline]
            fn cells_mut(data: &mut ColumnData) -> Option<&mut Vec<Self>> {
                match data {
                    ColumnData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            // NaN is equal to itself so rewriting a NaN is not a change.
            #[inline]
            fn cell_eq(&self, other: &Self) -> bool {
                self == other || (self.is_nan() && other.is_nan())
            }
        }
    };
}

impl_float_cell_type!(f32, Float32);
impl_float_cell_type!(f64, Float64);

impl CellType for StrCell {
    const HAS_PAYLOAD: bool = true;

    fn cells(data: &ColumnData) -> Option<&Vec<Self>> {
        match data {
            ColumnData::Str(v) => Some(v),
            _ => None,
        }
    }

    fn cells_mut(data: &mut ColumnData) -> Option<&mut Vec<Self>> {
        match data {
            ColumnData::Str(v) => Some(v),
            _ => None,
        }
    }

    fn cell_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
            (None, None) => true,
            _ => false,
        }
    }
}

impl CellType for ObjectCell {
    const HAS_PAYLOAD: bool = true;

    fn cells(data: &ColumnData) -> Option<&Vec<Self>> {
        match data {
            ColumnData::Object(v) => Some(v),
            _ => None,
        }
    }

    fn cells_mut(data: &mut ColumnData) -> Option<&mut Vec<Self>> {
        match data {
            ColumnData::Object(v) => Some(v),
            _ => None,
        }
    }

    fn cell_eq(&self, other: &Self) -> bool {
        self == other
    }
}

/// A typed, nullable column.
#[derive(Clone, Debug)]
pub struct Column {
    dtype: DataType,
    data: ColumnData,
    valid: Bitmap,
    vocab: Vocab,
}

impl Column {
    /// Creates an empty column.
    pub fn new(dtype: DataType) -> Self {
        Self::with_len(dtype, 0)
    }

    /// Creates a column of `len` invalid cells.
    pub fn with_len(dtype: DataType, len: usize) -> Self {
        Self {
            dtype,
            data: ColumnData::new(dtype, len),
            valid: Bitmap::with_len(len, false),
            vocab: Vocab::new(),
        }
    }

    /// Builds a column from scalars, casting each one to `dtype`.
    pub fn from_scalars(dtype: DataType, values: &[Scalar]) -> Result<Self> {
        let mut column = Column::with_len(dtype, values.len());
        for (idx, value) in values.iter().enumerate() {
            column.set_scalar(idx, value)?;
        }
        Ok(column)
    }

    #[inline]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.valid.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    #[inline]
    pub fn validity(&self) -> &Bitmap {
        &self.valid
    }

    #[inline]
    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Drops dictionary entries no cell references anymore.
    pub fn collect_vocab(&mut self) -> usize {
        self.vocab.collect()
    }

    /// Typed view of the cells. Returns None if `T` is not this column's
    /// cell type.
    #[inline]
    pub fn values<T: CellType>(&self) -> Option<&[T]> {
        T::cells(&self.data).map(|v| v.as_slice())
    }

    /// Mutable typed view of the cells together with the validity bitmap.
    #[inline]
    pub fn values_mut<T: CellType>(&mut self) -> Option<(&mut [T], &mut Bitmap)> {
        let valid = &mut self.valid;
        T::cells_mut(&mut self.data).map(move |v| (v.as_mut_slice(), valid))
    }

    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        self.valid.get(idx)
    }

    /// Sets the validity of a cell. Invalidating a string or object cell
    /// releases its handle.
    pub fn set_valid(&mut self, idx: usize, valid: bool) {
        self.valid.set(idx, valid);
        if !valid {
            match &mut self.data {
                ColumnData::Str(v) => v[idx] = None,
                ColumnData::Object(v) => v[idx] = None,
                _ => {}
            }
        }
    }

    /// Invalidates a cell.
    #[inline]
    pub fn clear_cell(&mut self, idx: usize) {
        self.set_valid(idx, false);
    }

    pub fn null_count(&self) -> usize {
        self.valid.count_zeros()
    }

    /// Reads a cell, returning `Scalar::Null` for invalid cells.
    pub fn get_scalar(&self, idx: usize) -> Scalar {
        if !self.is_valid(idx) {
            return Scalar::Null;
        }
        match &self.data {
            ColumnData::Bool(v) => Scalar::Bool(v[idx]),
            ColumnData::Int8(v) => Scalar::Int8(v[idx]),
            ColumnData::Int16(v) => Scalar::Int16(v[idx]),
            ColumnData::Int32(v) => Scalar::Int32(v[idx]),
            ColumnData::Int64(v) => Scalar::Int64(v[idx]),
            ColumnData::UInt8(v) => Scalar::UInt8(v[idx]),
            ColumnData::UInt16(v) => Scalar::UInt16(v[idx]),
            ColumnData::UInt32(v) => Scalar::UInt32(v[idx]),
            ColumnData::UInt64(v) => Scalar::UInt64(v[idx]),
            ColumnData::Float32(v) => Scalar::Float32(v[idx]),
            ColumnData::Float64(v) => Scalar::Float64(v[idx]),
            ColumnData::Str(v) => v[idx].clone().map(Scalar::Str).unwrap_or(Scalar::Null),
            ColumnData::Date(v) => Scalar::Date(v[idx]),
            ColumnData::DateTime(v) => Scalar::DateTime(v[idx]),
            ColumnData::Object(v) => v[idx].clone().map(Scalar::Object).unwrap_or(Scalar::Null),
        }
    }

    /// Reads a numeric cell widened to `f64`.
    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        if !self.is_valid(idx) {
            return None;
        }
        match &self.data {
            ColumnData::Int8(v) => Some(v[idx] as f64),
            ColumnData::Int16(v) => Some(v[idx] as f64),
            ColumnData::Int32(v) => Some(v[idx] as f64),
            ColumnData::Int64(v) => Some(v[idx] as f64),
            ColumnData::UInt8(v) => Some(v[idx] as f64),
            ColumnData::UInt16(v) => Some(v[idx] as f64),
            ColumnData::UInt32(v) => Some(v[idx] as f64),
            ColumnData::UInt64(v) => Some(v[idx] as f64),
            ColumnData::Float32(v) => Some(v[idx] as f64),
            ColumnData::Float64(v) => Some(v[idx]),
            _ => None,
        }
    }

    /// Writes a cell. `Scalar::Null` invalidates it.
    ///
    /// Returns `Error::Unrepresentable` when the value does not fit this
    /// column's type; the caller is expected to promote and retry.
    pub fn set_scalar(&mut self, idx: usize, value: &Scalar) -> Result<()> {
        let value = value
            .cast(self.dtype)
            .ok_or_else(|| Error::unrepresentable("", self.dtype))?;
        if value.is_null() {
            self.set_valid(idx, false);
            return Ok(());
        }
        match (&mut self.data, value) {
            (ColumnData::Bool(v), Scalar::Bool(x)) => v[idx] = x,
            (ColumnData::Int8(v), Scalar::Int8(x)) => v[idx] = x,
            (ColumnData::Int16(v), Scalar::Int16(x)) => v[idx] = x,
            (ColumnData::Int32(v), Scalar::Int32(x)) => v[idx] = x,
            (ColumnData::Int64(v), Scalar::Int64(x)) => v[idx] = x,
            (ColumnData::UInt8(v), Scalar::UInt8(x)) => v[idx] = x,
            (ColumnData::UInt16(v), Scalar::UInt16(x)) => v[idx] = x,
            (ColumnData::UInt32(v), Scalar::UInt32(x)) => v[idx] = x,
            (ColumnData::UInt64(v), Scalar::UInt64(x)) => v[idx] = x,
            (ColumnData::Float32(v), Scalar::Float32(x)) => v[idx] = x,
            (ColumnData::Float64(v), Scalar::Float64(x)) => v[idx] = x,
            (ColumnData::Str(v), Scalar::Str(x)) => v[idx] = Some(self.vocab.intern_arc(&x)),
            (ColumnData::Date(v), Scalar::Date(x)) => v[idx] = x,
            (ColumnData::DateTime(v), Scalar::DateTime(x)) => v[idx] = x,
            (ColumnData::Object(v), Scalar::Object(x)) => v[idx] = Some(x),
            (_, other) => {
                return Err(InvariantViolation::DtypeMismatch {
                    column: alloc::string::String::new(),
                    expected: self.dtype,
                    got: other.data_type().unwrap_or(self.dtype),
                }
                .into())
            }
        }
        self.valid.set(idx, true);
        Ok(())
    }

    /// Appends one cell.
    pub fn push_scalar(&mut self, value: &Scalar) -> Result<()> {
        self.extend(1);
        let idx = self.len() - 1;
        if let Err(err) = self.set_scalar(idx, value) {
            self.truncate(idx);
            return Err(err);
        }
        Ok(())
    }

    /// Grows the column by `n` invalid cells.
    pub fn extend(&mut self, n: usize) {
        self.resize(self.len() + n);
    }

    /// Resizes to `len` rows; new rows are invalid.
    pub fn resize(&mut self, len: usize) {
        each_variant!(&mut self.data, v => v.resize(len, Default::default()));
        self.valid.resize(len, false);
    }

    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.resize(len);
        }
    }

    /// Drops every row.
    pub fn clear(&mut self) {
        self.resize(0);
    }

    fn check_dtype(&self, other: &Column) -> Result<()> {
        if self.dtype != other.dtype {
            return Err(InvariantViolation::DtypeMismatch {
                column: alloc::string::String::new(),
                expected: self.dtype,
                got: other.dtype,
            }
            .into());
        }
        Ok(())
    }

    /// Appends all rows of `other`, which must have the same type.
    pub fn append(&mut self, other: &Column) -> Result<()> {
        self.check_dtype(other)?;
        let offset = self.len();
        match &other.data {
            ColumnData::Str(src) => {
                self.resize(offset + other.len());
                if let ColumnData::Str(dst) = &mut self.data {
                    for (idx, cell) in src.iter().enumerate() {
                        dst[offset + idx] = cell.as_ref().map(|s| self.vocab.intern_arc(s));
                    }
                }
            }
            _ => {
                with_cell_type!(self.dtype, T => {
                    if let (Some(dst), Some(src)) = (T::cells_mut(&mut self.data), T::cells(&other.data)) {
                        dst.extend_from_slice(src);
                    }
                });
                self.valid.resize(offset + other.len(), false);
            }
        }
        for idx in 0..other.len() {
            if other.is_valid(idx) {
                self.valid.set(offset + idx, true);
            }
        }
        Ok(())
    }

    /// Copies one cell (value and validity) from `src`. Strings are
    /// interned through this column's vocabulary.
    pub fn copy_cell_from(&mut self, dst_idx: usize, src: &Column, src_idx: usize) -> Result<()> {
        self.check_dtype(src)?;
        if !src.is_valid(src_idx) {
            self.set_valid(dst_idx, false);
            return Ok(());
        }
        match (&mut self.data, &src.data) {
            (ColumnData::Str(dst), ColumnData::Str(from)) => {
                dst[dst_idx] = from[src_idx].as_ref().map(|s| self.vocab.intern_arc(s));
            }
            _ => with_cell_type!(self.dtype, T => {
                if let (Some(dst), Some(from)) = (T::cells_mut(&mut self.data), T::cells(&src.data)) {
                    dst[dst_idx] = from[src_idx].clone();
                }
            }),
        }
        self.valid.set(dst_idx, true);
        Ok(())
    }

    /// Returns a new column holding the rows at `indices`, in order.
    pub fn gather(&self, indices: &[usize]) -> Column {
        let data = map_variant!(&self.data, v => indices.iter().map(|&i| v[i].clone()).collect());
        let valid = indices.iter().map(|&i| self.valid.get(i)).collect();
        Column {
            dtype: self.dtype,
            data,
            valid,
            vocab: self.vocab.clone(),
        }
    }

    /// Iterates over the cells as scalars.
    pub fn iter_scalars(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.len()).map(move |idx| self.get_scalar(idx))
    }

    /// Rewrites the column as `new_dtype` in place.
    ///
    /// Valid rows below `from_row` are converted; rows at or above it are
    /// left invalid, or set to `new_dtype`'s default when `fill_default`.
    pub fn promote(&mut self, new_dtype: DataType, from_row: usize, fill_default: bool) -> Result<()> {
        if new_dtype == self.dtype {
            return Ok(());
        }
        let no_path = || -> Error {
            InvariantViolation::NoPromotionPath {
                from: self.dtype,
                to: new_dtype,
            }
            .into()
        };
        if !self.dtype.can_promote_to(new_dtype) {
            return Err(no_path());
        }
        let mut promoted = Column::with_len(new_dtype, self.len());
        let default = Scalar::default_for(new_dtype);
        for idx in 0..self.len() {
            if idx < from_row {
                if self.is_valid(idx) {
                    let converted = self.get_scalar(idx).cast(new_dtype).ok_or_else(no_path)?;
                    promoted.set_scalar(idx, &converted)?;
                }
            } else if fill_default {
                promoted.set_scalar(idx, &default)?;
            }
        }
        *self = promoted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_len_is_invalid() {
        let column = Column::with_len(DataType::Int32, 4);
        assert_eq!(column.len(), 4);
        assert_eq!(column.null_count(), 4);
        assert_eq!(column.get_scalar(2), Scalar::Null);
    }

    #[test]
    fn test_set_and_get() {
        let mut column = Column::with_len(DataType::Float64, 3);
        column.set_scalar(0, &Scalar::Float64(1.5)).unwrap();
        column.set_scalar(1, &Scalar::Int32(2)).unwrap();
        assert_eq!(column.get_scalar(0), Scalar::Float64(1.5));
        assert_eq!(column.get_f64(1), Some(2.0));
        assert!(!column.is_valid(2));
        assert_eq!(column.values::<f64>().unwrap()[1], 2.0);
        assert!(column.values::<i32>().is_none());
    }

    #[test]
    fn test_unrepresentable() {
        let mut column = Column::with_len(DataType::Int32, 1);
        let err = column.set_scalar(0, &Scalar::Int64(i64::MAX)).unwrap_err();
        assert!(matches!(err, Error::Unrepresentable { .. }));
        let err = column.set_scalar(0, &Scalar::str("abc")).unwrap_err();
        assert!(matches!(err, Error::Unrepresentable { .. }));
        assert!(!column.is_valid(0));
    }

    #[test]
    fn test_string_handles_released() {
        let mut column = Column::with_len(DataType::String, 2);
        column.set_scalar(0, &Scalar::str("x")).unwrap();
        column.set_scalar(1, &Scalar::str("x")).unwrap();
        assert_eq!(column.vocab().ref_count("x"), 2);
        column.clear_cell(0);
        assert_eq!(column.vocab().ref_count("x"), 1);
        column.set_scalar(1, &Scalar::str("y")).unwrap();
        assert_eq!(column.vocab().ref_count("x"), 0);
        assert_eq!(column.collect_vocab(), 1);
        assert_eq!(column.vocab().len(), 1);
    }

    #[test]
    fn test_object_handles_released() {
        let obj = ObjectRef::new(5u8);
        let mut column = Column::with_len(DataType::Object, 1);
        column.set_scalar(0, &Scalar::Object(obj.clone())).unwrap();
        assert_eq!(obj.ref_count(), 2);
        column.clear_cell(0);
        assert_eq!(obj.ref_count(), 1);
    }

    #[test]
    fn test_extend_preserves_validity() {
        let mut column = Column::from_scalars(DataType::Int64, &[Scalar::Int64(1), Scalar::Null]).unwrap();
        column.extend(3);
        assert_eq!(column.len(), 5);
        assert!(column.is_valid(0));
        assert!(!column.is_valid(1));
        assert!(!column.is_valid(4));
    }

    #[test]
    fn test_append_and_gather() {
        let mut a = Column::from_scalars(DataType::String, &[Scalar::str("a"), Scalar::Null]).unwrap();
        let b = Column::from_scalars(DataType::String, &[Scalar::str("b")]).unwrap();
        a.append(&b).unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(a.get_scalar(2), Scalar::str("b"));

        let g = a.gather(&[2, 1, 0]);
        assert_eq!(g.get_scalar(0), Scalar::str("b"));
        assert_eq!(g.get_scalar(1), Scalar::Null);

        let c = Column::new(DataType::Int32);
        assert!(a.append(&c).unwrap_err().is_invariant());
    }

    #[test]
    fn test_promote_int_to_float() {
        let mut column =
            Column::from_scalars(DataType::Int32, &[Scalar::Int32(1), Scalar::Null, Scalar::Int32(3)]).unwrap();
        column.promote(DataType::Float64, 2, false).unwrap();
        assert_eq!(column.dtype(), DataType::Float64);
        assert_eq!(column.get_scalar(0), Scalar::Float64(1.0));
        assert!(!column.is_valid(1));
        // rows at or above from_row are left for the caller
        assert!(!column.is_valid(2));
    }

    #[test]
    fn test_promote_to_string_fill_default() {
        let mut column = Column::from_scalars(DataType::Int32, &[Scalar::Int32(7), Scalar::Int32(8)]).unwrap();
        column.promote(DataType::String, 1, true).unwrap();
        assert_eq!(column.get_scalar(0), Scalar::str("7"));
        assert_eq!(column.get_scalar(1), Scalar::str(""));
    }

    #[test]
    fn test_promote_without_path() {
        let mut column = Column::with_len(DataType::String, 1);
        let err = column.promote(DataType::Int32, 1, false).unwrap_err();
        assert!(err.is_invariant());
    }
}
