//! Scalar cell values.
//!
//! A `Scalar` is the row-oriented view of a single cell: it is what adapters
//! hand to `Column::set_scalar`, what contexts read back for pivot paths and
//! aggregates, and what `get_data` returns to consumers.

use crate::types::DataType;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use core::any::Any;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

const MS_PER_DAY: i64 = 86_400_000;

/// A reference-counted opaque payload stored in `Object` columns.
///
/// Cloning bumps the reference count and dropping releases it, so a column
/// that overwrites or clears a cell gives up its reference automatically.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn Any + Send + Sync>);

impl ObjectRef {
    /// Wraps a value into a new object reference.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Returns the payload if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).downcast_ref::<T>()
    }

    /// Returns the number of live references to the payload.
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    #[inline]
    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.addr())
    }
}

/// A single, possibly null, typed value.
#[derive(Clone, Debug)]
pub enum Scalar {
    /// Missing or invalid value
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    /// Interned string
    Str(Arc<str>),
    /// Days since the Unix epoch
    Date(i32),
    /// Milliseconds since the Unix epoch
    DateTime(i64),
    Object(ObjectRef),
}

impl Scalar {
    /// Creates a string scalar.
    pub fn str(value: &str) -> Self {
        Scalar::Str(Arc::from(value))
    }

    /// Creates a date scalar from a calendar date.
    pub fn date(year: i32, month: u32, day: u32) -> Self {
        Scalar::Date(days_from_civil(year, month, day))
    }

    /// Returns the data type of this value, or None if it's Null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Bool),
            Scalar::Int8(_) => Some(DataType::Int8),
            Scalar::Int16(_) => Some(DataType::Int16),
            Scalar::Int32(_) => Some(DataType::Int32),
            Scalar::Int64(_) => Some(DataType::Int64),
            Scalar::UInt8(_) => Some(DataType::UInt8),
            Scalar::UInt16(_) => Some(DataType::UInt16),
            Scalar::UInt32(_) => Some(DataType::UInt32),
            Scalar::UInt64(_) => Some(DataType::UInt64),
            Scalar::Float32(_) => Some(DataType::Float32),
            Scalar::Float64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::String),
            Scalar::Date(_) => Some(DataType::Date),
            Scalar::DateTime(_) => Some(DataType::DateTime),
            Scalar::Object(_) => Some(DataType::Object),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.is_null()
    }

    /// Returns true for integer and floating point values.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.data_type().map(|t| t.is_numeric()).unwrap_or(false)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the numeric value widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int8(v) => Some(*v as f64),
            Scalar::Int16(v) => Some(*v as f64),
            Scalar::Int32(v) => Some(*v as f64),
            Scalar::Int64(v) => Some(*v as f64),
            Scalar::UInt8(v) => Some(*v as f64),
            Scalar::UInt16(v) => Some(*v as f64),
            Scalar::UInt32(v) => Some(*v as f64),
            Scalar::UInt64(v) => Some(*v as f64),
            Scalar::Float32(v) => Some(*v as f64),
            Scalar::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as an exact integer, if it is one.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Scalar::Int8(v) => Some(*v as i128),
            Scalar::Int16(v) => Some(*v as i128),
            Scalar::Int32(v) => Some(*v as i128),
            Scalar::Int64(v) => Some(*v as i128),
            Scalar::UInt8(v) => Some(*v as i128),
            Scalar::UInt16(v) => Some(*v as i128),
            Scalar::UInt32(v) => Some(*v as i128),
            Scalar::UInt64(v) => Some(*v as i128),
            Scalar::Float32(v) => integral_f64(*v as f64),
            Scalar::Float64(v) => integral_f64(*v),
            _ => None,
        }
    }

    /// Returns the datetime in milliseconds for `Date` and `DateTime` values.
    pub fn as_datetime(&self) -> Option<i64> {
        match self {
            Scalar::Date(d) => Some(*d as i64 * MS_PER_DAY),
            Scalar::DateTime(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Converts this value to `dtype`, returning None when the value cannot
    /// be represented (integer overflow, non-numeric token, ...).
    pub fn cast(&self, dtype: DataType) -> Option<Scalar> {
        if self.is_null() {
            return Some(Scalar::Null);
        }
        if self.data_type() == Some(dtype) {
            return Some(self.clone());
        }
        match dtype {
            DataType::Bool => match self {
                Scalar::Str(s) => match s.as_ref() {
                    "true" => Some(Scalar::Bool(true)),
                    "false" => Some(Scalar::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            DataType::Int8 => self.integer_value().and_then(|v| i8::try_from(v).ok()).map(Scalar::Int8),
            DataType::Int16 => self.integer_value().and_then(|v| i16::try_from(v).ok()).map(Scalar::Int16),
            DataType::Int32 => self.integer_value().and_then(|v| i32::try_from(v).ok()).map(Scalar::Int32),
            DataType::Int64 => self.integer_value().and_then(|v| i64::try_from(v).ok()).map(Scalar::Int64),
            DataType::UInt8 => self.integer_value().and_then(|v| u8::try_from(v).ok()).map(Scalar::UInt8),
            DataType::UInt16 => self.integer_value().and_then(|v| u16::try_from(v).ok()).map(Scalar::UInt16),
            DataType::UInt32 => self.integer_value().and_then(|v| u32::try_from(v).ok()).map(Scalar::UInt32),
            DataType::UInt64 => self.integer_value().and_then(|v| u64::try_from(v).ok()).map(Scalar::UInt64),
            DataType::Float32 => self.float_value().map(|v| Scalar::Float32(v as f32)),
            DataType::Float64 => self.float_value().map(Scalar::Float64),
            DataType::String => match self {
                Scalar::Object(_) => None,
                other => Some(Scalar::Str(Arc::from(format!("{}", other)))),
            },
            DataType::Date => match self {
                Scalar::Str(s) => parse_date(s).map(Scalar::Date),
                other if other.data_type().map(|t| t.is_integer()).unwrap_or(false) => other
                    .as_i128()
                    .and_then(|v| i32::try_from(v).ok())
                    .map(Scalar::Date),
                _ => None,
            },
            DataType::DateTime => match self {
                Scalar::Date(d) => Some(Scalar::DateTime(*d as i64 * MS_PER_DAY)),
                Scalar::Str(s) => parse_date(s).map(|d| Scalar::DateTime(d as i64 * MS_PER_DAY)),
                other if other.data_type().map(|t| t.is_integer()).unwrap_or(false) => other
                    .as_i128()
                    .and_then(|v| i64::try_from(v).ok())
                    .map(Scalar::DateTime),
                _ => None,
            },
            DataType::Object => None,
        }
    }

    fn integer_value(&self) -> Option<i128> {
        match self {
            Scalar::Str(s) => s.trim().parse::<i128>().ok(),
            Scalar::Bool(_) | Scalar::Date(_) | Scalar::DateTime(_) | Scalar::Object(_) => None,
            other => other.as_i128(),
        }
    }

    fn float_value(&self) -> Option<f64> {
        match self {
            Scalar::Str(s) => s.trim().parse::<f64>().ok(),
            other => other.as_f64(),
        }
    }

    /// Returns the default (zero) value for `dtype`.
    pub fn default_for(dtype: DataType) -> Scalar {
        match dtype {
            DataType::Bool => Scalar::Bool(false),
            DataType::Int8 => Scalar::Int8(0),
            DataType::Int16 => Scalar::Int16(0),
            DataType::Int32 => Scalar::Int32(0),
            DataType::Int64 => Scalar::Int64(0),
            DataType::UInt8 => Scalar::UInt8(0),
            DataType::UInt16 => Scalar::UInt16(0),
            DataType::UInt32 => Scalar::UInt32(0),
            DataType::UInt64 => Scalar::UInt64(0),
            DataType::Float32 => Scalar::Float32(0.0),
            DataType::Float64 => Scalar::Float64(0.0),
            DataType::String => Scalar::str(""),
            DataType::Date => Scalar::Date(0),
            DataType::DateTime => Scalar::DateTime(0),
            DataType::Object => Scalar::Null,
        }
    }

    fn type_order(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::Int8(_)
            | Scalar::Int16(_)
            | Scalar::Int32(_)
            | Scalar::Int64(_)
            | Scalar::UInt8(_)
            | Scalar::UInt16(_)
            | Scalar::UInt32(_)
            | Scalar::UInt64(_)
            | Scalar::Float32(_)
            | Scalar::Float64(_) => 2,
            Scalar::Str(_) => 3,
            Scalar::Date(_) | Scalar::DateTime(_) => 4,
            Scalar::Object(_) => 5,
        }
    }
}

fn integral_f64(v: f64) -> Option<i128> {
    if v.is_finite() && v >= i128::MIN as f64 && v <= i128::MAX as f64 && (v as i128) as f64 == v {
        Some(v as i128)
    } else {
        None
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    // NaN sorts after every other number
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => Ordering::Equal,
            (Scalar::Null, _) => Ordering::Less,
            (_, Scalar::Null) => Ordering::Greater,
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Str(a), Scalar::Str(b)) => a.as_ref().cmp(b.as_ref()),
            (Scalar::Date(a), Scalar::Date(b)) => a.cmp(b),
            (Scalar::Object(a), Scalar::Object(b)) => a.addr().cmp(&b.addr()),
            (a, b) if a.type_order() == 2 && b.type_order() == 2 => {
                match (a.as_i128(), b.as_i128()) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    _ => cmp_f64(a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN)),
                }
            }
            (a, b) if a.type_order() == 4 && b.type_order() == 4 => {
                a.as_datetime().cmp(&b.as_datetime())
            }
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must agree with `Ord`: numerically equal values hash equally.
        self.type_order().hash(state);
        match self {
            Scalar::Null => {}
            Scalar::Bool(b) => b.hash(state),
            Scalar::Str(s) => s.as_ref().hash(state),
            Scalar::Date(_) | Scalar::DateTime(_) => self.as_datetime().hash(state),
            Scalar::Object(o) => o.hash(state),
            numeric => match numeric.as_i128() {
                Some(v) => v.hash(state),
                None => {
                    let f = numeric.as_f64().unwrap_or(f64::NAN);
                    if f.is_nan() {
                        u64::MAX.hash(state)
                    } else {
                        f.to_bits().hash(state)
                    }
                }
            },
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int8(v) => write!(f, "{}", v),
            Scalar::Int16(v) => write!(f, "{}", v),
            Scalar::Int32(v) => write!(f, "{}", v),
            Scalar::Int64(v) => write!(f, "{}", v),
            Scalar::UInt8(v) => write!(f, "{}", v),
            Scalar::UInt16(v) => write!(f, "{}", v),
            Scalar::UInt32(v) => write!(f, "{}", v),
            Scalar::UInt64(v) => write!(f, "{}", v),
            Scalar::Float32(v) => write!(f, "{}", v),
            Scalar::Float64(v) => write!(f, "{}", v),
            Scalar::Str(v) => write!(f, "{}", v),
            Scalar::Date(d) => {
                let (y, m, day) = civil_from_days(*d);
                write!(f, "{:04}-{:02}-{:02}", y, m, day)
            }
            Scalar::DateTime(ms) => {
                let days = ms.div_euclid(MS_PER_DAY);
                let rem = ms.rem_euclid(MS_PER_DAY);
                let (y, m, day) = civil_from_days(days as i32);
                write!(
                    f,
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
                    y,
                    m,
                    day,
                    rem / 3_600_000,
                    (rem / 60_000) % 60,
                    (rem / 1000) % 60,
                    rem % 1000
                )
            }
            Scalar::Object(o) => write!(f, "{:?}", o),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int32(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int64(v)
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Scalar::UInt64(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float64(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::str(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(Arc::from(v))
    }
}

impl<T> From<Option<T>> for Scalar
where
    T: Into<Scalar>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Scalar::Null,
        }
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
pub fn days_from_civil(year: i32, month: u32, day: u32) -> i32 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let m = month as i32;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i32 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Calendar date for a count of days since 1970-01-01.
pub fn civil_from_days(days: i32) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

fn parse_date(s: &str) -> Option<i32> {
    let mut parts = s.trim().splitn(3, '-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    let day = parts.next()?.get(..2)?.parse::<u32>().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(days_from_civil(year, month, day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use hashbrown::HashSet;

    #[test]
    fn test_scalar_type_check() {
        assert_eq!(Scalar::Int64(42).data_type(), Some(DataType::Int64));
        assert_eq!(Scalar::Null.data_type(), None);
        assert!(Scalar::Null.is_null());
        assert!(Scalar::Float32(1.0).is_numeric());
        assert!(!Scalar::str("1").is_numeric());
    }

    #[test]
    fn test_cross_type_numeric_equality() {
        assert_eq!(Scalar::Int32(42), Scalar::Int64(42));
        assert_eq!(Scalar::Int32(42), Scalar::Float64(42.0));
        assert_ne!(Scalar::Int32(42), Scalar::Float64(42.5));

        let mut set = HashSet::new();
        set.insert(Scalar::Int32(7));
        assert!(set.contains(&Scalar::UInt64(7)));
        assert!(set.contains(&Scalar::Float64(7.0)));
    }

    #[test]
    fn test_ordering() {
        assert!(Scalar::Null < Scalar::Int32(0));
        assert!(Scalar::Int32(1) < Scalar::Float64(1.5));
        assert!(Scalar::str("a") < Scalar::str("b"));
        assert!(Scalar::Float64(f64::NAN) > Scalar::Float64(f64::INFINITY));
        assert!(Scalar::date(2020, 1, 1) < Scalar::date(2020, 1, 2));
    }

    #[test]
    fn test_cast_overflow() {
        assert_eq!(Scalar::Int64(1 << 40).cast(DataType::Int32), None);
        assert_eq!(Scalar::Int64(12).cast(DataType::Int32), Some(Scalar::Int32(12)));
        assert_eq!(Scalar::Float64(2.5).cast(DataType::Int32), None);
        assert_eq!(Scalar::Int32(-1).cast(DataType::UInt8), None);
    }

    #[test]
    fn test_cast_string_token() {
        assert_eq!(Scalar::str("12").cast(DataType::Int32), Some(Scalar::Int32(12)));
        assert_eq!(Scalar::str("abc").cast(DataType::Int32), None);
        assert_eq!(Scalar::Int32(5).cast(DataType::String), Some(Scalar::str("5")));
        assert_eq!(Scalar::Null.cast(DataType::Float64), Some(Scalar::Null));
    }

    #[test]
    fn test_dates() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        let d = days_from_civil(2024, 2, 29);
        assert_eq!(civil_from_days(d), (2024, 2, 29));
        assert_eq!(Scalar::date(2019, 12, 31).to_string(), "2019-12-31");
        assert_eq!(Scalar::str("2019-12-31").cast(DataType::Date), Some(Scalar::date(2019, 12, 31)));
        assert_eq!(Scalar::DateTime(MS_PER_DAY + 1500).to_string(), "1970-01-02 00:00:01.500");
    }

    #[test]
    fn test_object_ref_counting() {
        let obj = ObjectRef::new(41u32);
        assert_eq!(obj.ref_count(), 1);
        let scalar = Scalar::Object(obj.clone());
        assert_eq!(obj.ref_count(), 2);
        drop(scalar);
        assert_eq!(obj.ref_count(), 1);
        assert_eq!(obj.downcast_ref::<u32>(), Some(&41));
    }
}
