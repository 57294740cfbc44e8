//! Sort specifications.

use alloc::string::{String, ToString};
use core::cmp::Ordering;
use rill_core::{Error, Result, Scalar};

/// Sort order of one sort spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Asc,
    Desc,
    /// Keeps the natural order.
    None,
    /// Ascending by absolute value.
    AscAbs,
    /// Descending by absolute value.
    DescAbs,
}

impl SortOrder {
    pub fn from_name(name: &str) -> Result<SortOrder> {
        Ok(match name {
            "asc" => SortOrder::Asc,
            "desc" => SortOrder::Desc,
            "none" => SortOrder::None,
            "asc abs" => SortOrder::AscAbs,
            "desc abs" => SortOrder::DescAbs,
            other => return Err(Error::unknown_sort_order(other)),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
            SortOrder::None => "none",
            SortOrder::AscAbs => "asc abs",
            SortOrder::DescAbs => "desc abs",
        }
    }

    /// Compares two values under this order.
    pub fn compare(&self, a: &Scalar, b: &Scalar) -> Ordering {
        match self {
            SortOrder::None => Ordering::Equal,
            SortOrder::Asc => a.cmp(b),
            SortOrder::Desc => b.cmp(a),
            SortOrder::AscAbs => abs_key(a).cmp(&abs_key(b)),
            SortOrder::DescAbs => abs_key(b).cmp(&abs_key(a)),
        }
    }
}

fn abs_key(value: &Scalar) -> Scalar {
    match value.as_f64() {
        Some(v) => Scalar::Float64(libm::fabs(v)),
        None => value.clone(),
    }
}

/// Sort by `column` in `order`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(column: &str, order: SortOrder) -> Self {
        Self {
            column: column.to_string(),
            order,
        }
    }
}

/// Compares two key tuples under a list of orders, first difference wins.
pub(crate) fn compare_keys(orders: &[SortOrder], a: &[Scalar], b: &[Scalar]) -> Ordering {
    for ((order, x), y) in orders.iter().zip(a.iter()).zip(b.iter()) {
        match order.compare(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Stable-sorts sibling ids by the keys `key(id, spec)` yields per spec.
pub(crate) fn sort_siblings<T: Copy>(
    ids: &mut [T],
    sorts: &[SortSpec],
    mut key: impl FnMut(&T, &SortSpec) -> Scalar,
) {
    if sorts.is_empty() || sorts.iter().all(|s| s.order == SortOrder::None) {
        return;
    }
    let orders: alloc::vec::Vec<SortOrder> = sorts.iter().map(|s| s.order).collect();
    let mut keyed: alloc::vec::Vec<(alloc::vec::Vec<Scalar>, usize)> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (sorts.iter().map(|s| key(id, s)).collect(), i))
        .collect();
    keyed.sort_by(|a, b| compare_keys(&orders, &a.0, &b.0));
    let sorted: alloc::vec::Vec<T> = keyed.into_iter().map(|(_, i)| ids[i]).collect();
    ids.copy_from_slice(&sorted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_parse() {
        assert_eq!(SortOrder::from_name("desc abs").unwrap(), SortOrder::DescAbs);
        assert_eq!(
            SortOrder::from_name("sideways"),
            Err(Error::unknown_sort_order("sideways"))
        );
    }

    #[test]
    fn test_abs_orders() {
        let a = Scalar::Int32(-10);
        let b = Scalar::Int32(5);
        assert_eq!(SortOrder::Asc.compare(&a, &b), Ordering::Less);
        assert_eq!(SortOrder::AscAbs.compare(&a, &b), Ordering::Greater);
        assert_eq!(SortOrder::DescAbs.compare(&a, &b), Ordering::Less);
        assert_eq!(SortOrder::None.compare(&a, &b), Ordering::Equal);
    }

    #[test]
    fn test_compare_keys() {
        let orders = [SortOrder::Asc, SortOrder::Desc];
        let a = vec![Scalar::str("x"), Scalar::Int32(1)];
        let b = vec![Scalar::str("x"), Scalar::Int32(2)];
        assert_eq!(compare_keys(&orders, &a, &b), Ordering::Greater);
    }

    #[test]
    fn test_sort_siblings_is_stable() {
        let values = [3, 1, 3, 2];
        let mut ids = [0usize, 1, 2, 3];
        let sorts = [SortSpec::new("v", SortOrder::Desc)];
        sort_siblings(&mut ids, &sorts, |&id, _| Scalar::Int32(values[id]));
        assert_eq!(ids, [0, 2, 3, 1]);

        let mut untouched = [2usize, 0, 1];
        sort_siblings(&mut untouched, &[SortSpec::new("v", SortOrder::None)], |_, _| Scalar::Null);
        assert_eq!(untouched, [2, 0, 1]);
    }
}
