//! Incremental aggregates.
//!
//! Every tree node (or ctx2 cell) keeps one `AggState` per aggregate spec.
//! A state is updated by adding or retracting the contribution of one row,
//! so no aggregate ever rescans its leaves.

use alloc::collections::BTreeMap;
use rill_core::{DataType, Error, Result, Scalar};

/// Aggregate functions available to pivoted contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Sum,
    Count,
    Mean,
    WeightedMean,
    Min,
    Max,
    DistinctCount,
    /// The value if every contributing row agrees on it, else null.
    Unique,
    /// Sum as a percentage of the parent node's sum.
    PctSumParent,
    /// Sum as a percentage of the grand total.
    PctSumGrandTotal,
    /// An arbitrary contributing value (the smallest).
    Any,
}

impl Aggregate {
    /// Parses an aggregate name.
    pub fn from_name(name: &str) -> Result<Aggregate> {
        Ok(match name {
            "sum" => Aggregate::Sum,
            "count" => Aggregate::Count,
            "mean" | "avg" => Aggregate::Mean,
            "weighted mean" => Aggregate::WeightedMean,
            "low" | "min" => Aggregate::Min,
            "high" | "max" => Aggregate::Max,
            "distinct count" => Aggregate::DistinctCount,
            "unique" => Aggregate::Unique,
            "pct sum parent" => Aggregate::PctSumParent,
            "pct sum grand total" => Aggregate::PctSumGrandTotal,
            "any" => Aggregate::Any,
            other => return Err(Error::unknown_aggregate(other)),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::Sum => "sum",
            Aggregate::Count => "count",
            Aggregate::Mean => "mean",
            Aggregate::WeightedMean => "weighted mean",
            Aggregate::Min => "low",
            Aggregate::Max => "high",
            Aggregate::DistinctCount => "distinct count",
            Aggregate::Unique => "unique",
            Aggregate::PctSumParent => "pct sum parent",
            Aggregate::PctSumGrandTotal => "pct sum grand total",
            Aggregate::Any => "any",
        }
    }

    /// Default aggregate for a column type: numeric columns sum, everything
    /// else counts.
    pub fn default_for(dtype: DataType) -> Aggregate {
        if dtype.is_numeric() {
            Aggregate::Sum
        } else {
            Aggregate::Count
        }
    }

    /// Type of the aggregate's result for an input column of type `input`.
    pub fn output_type(&self, input: DataType) -> DataType {
        match self {
            Aggregate::Count | Aggregate::DistinctCount => DataType::Int64,
            Aggregate::Mean
            | Aggregate::WeightedMean
            | Aggregate::PctSumParent
            | Aggregate::PctSumGrandTotal => DataType::Float64,
            Aggregate::Sum if input.is_integer() => DataType::Int64,
            Aggregate::Sum => DataType::Float64,
            Aggregate::Min | Aggregate::Max | Aggregate::Unique | Aggregate::Any => input,
        }
    }

    /// Whether the aggregate reads a weight column.
    #[inline]
    pub fn is_weighted(&self) -> bool {
        matches!(self, Aggregate::WeightedMean)
    }

    /// Whether the aggregate is derived from sums of other nodes.
    #[inline]
    pub fn is_relative(&self) -> bool {
        matches!(self, Aggregate::PctSumParent | Aggregate::PctSumGrandTotal)
    }
}

/// Running state of one aggregate at one node.
#[derive(Clone, Debug, PartialEq)]
pub enum AggState {
    /// `exact` accumulates integer inputs without rounding.
    Sum { sum: f64, exact: i128, valid: usize },
    Count { count: i64 },
    Mean { sum: f64, count: usize },
    Weighted { product: f64, weight: f64, count: usize },
    /// Multiset of contributing values.
    Values(BTreeMap<Scalar, usize>),
}

impl AggState {
    pub fn new(agg: Aggregate) -> Self {
        match agg {
            Aggregate::Sum | Aggregate::PctSumParent | Aggregate::PctSumGrandTotal => {
                AggState::Sum {
                    sum: 0.0,
                    exact: 0,
                    valid: 0,
                }
            }
            Aggregate::Count => AggState::Count { count: 0 },
            Aggregate::Mean => AggState::Mean { sum: 0.0, count: 0 },
            Aggregate::WeightedMean => AggState::Weighted {
                product: 0.0,
                weight: 0.0,
                count: 0,
            },
            Aggregate::Min
            | Aggregate::Max
            | Aggregate::DistinctCount
            | Aggregate::Unique
            | Aggregate::Any => AggState::Values(BTreeMap::new()),
        }
    }

    /// Adds one row's contribution. Null values contribute nothing.
    pub fn add(&mut self, value: &Scalar, weight: &Scalar) {
        self.apply(value, weight, 1);
    }

    /// Retracts one row's contribution.
    pub fn retract(&mut self, value: &Scalar, weight: &Scalar) {
        self.apply(value, weight, -1);
    }

    fn apply(&mut self, value: &Scalar, weight: &Scalar, sign: i64) {
        if value.is_null() {
            return;
        }
        match self {
            AggState::Sum { sum, exact, valid } => {
                if let Some(v) = value.as_f64() {
                    *sum += v * sign as f64;
                    *exact += exact_integer(value).unwrap_or(0) * sign as i128;
                    *valid = (*valid as i64 + sign) as usize;
                }
            }
            AggState::Count { count } => *count += sign,
            AggState::Mean { sum, count } => {
                if let Some(v) = value.as_f64() {
                    *sum += v * sign as f64;
                    *count = (*count as i64 + sign) as usize;
                }
            }
            AggState::Weighted {
                product,
                weight: total,
                count,
            } => {
                if let (Some(v), Some(w)) = (value.as_f64(), weight.as_f64()) {
                    *product += v * w * sign as f64;
                    *total += w * sign as f64;
                    *count = (*count as i64 + sign) as usize;
                }
            }
            AggState::Values(values) => {
                if sign > 0 {
                    *values.entry(value.clone()).or_insert(0) += 1;
                } else if let Some(n) = values.get_mut(value) {
                    *n -= 1;
                    if *n == 0 {
                        values.remove(value);
                    }
                }
            }
        }
    }

    /// Applies `cur - prev` of a row whose value changed but stayed valid.
    /// Returns false for states that cannot absorb a delta.
    pub fn shift(&mut self, delta: &Scalar) -> bool {
        let Some(d) = delta.as_f64() else {
            return false;
        };
        match self {
            AggState::Sum { sum, exact, .. } => {
                *sum += d;
                *exact += exact_integer(delta).unwrap_or(0);
                true
            }
            AggState::Mean { sum, .. } => {
                *sum += d;
                true
            }
            _ => false,
        }
    }

    /// The running sum, for relative aggregates.
    pub fn sum(&self) -> Option<f64> {
        match self {
            AggState::Sum { sum, valid, .. } if *valid > 0 => Some(*sum),
            _ => None,
        }
    }

    /// Reads the aggregate value. Relative aggregates are resolved by the
    /// caller from `sum()`.
    pub fn value(&self, agg: Aggregate, input: DataType) -> Scalar {
        match self {
            AggState::Sum { sum, exact, valid } => {
                if *valid == 0 {
                    Scalar::Null
                } else if agg == Aggregate::Sum && input.is_integer() {
                    Scalar::Int64((*exact).clamp(i64::MIN as i128, i64::MAX as i128) as i64)
                } else {
                    Scalar::Float64(*sum)
                }
            }
            AggState::Count { count } => Scalar::Int64(*count),
            AggState::Mean { sum, count } => {
                if *count == 0 {
                    Scalar::Null
                } else {
                    Scalar::Float64(*sum / *count as f64)
                }
            }
            AggState::Weighted { product, weight, count } => {
                if *count == 0 || *weight == 0.0 {
                    Scalar::Null
                } else {
                    Scalar::Float64(*product / *weight)
                }
            }
            AggState::Values(values) => match agg {
                Aggregate::Min | Aggregate::Any => {
                    values.keys().next().cloned().unwrap_or(Scalar::Null)
                }
                Aggregate::Max => values.keys().next_back().cloned().unwrap_or(Scalar::Null),
                Aggregate::DistinctCount => Scalar::Int64(values.len() as i64),
                Aggregate::Unique if values.len() == 1 => {
                    values.keys().next().cloned().unwrap_or(Scalar::Null)
                }
                _ => Scalar::Null,
            },
        }
    }
}

/// Integer cells as `i128`; floats have no exact form here.
fn exact_integer(value: &Scalar) -> Option<i128> {
    match value {
        Scalar::Float32(_) | Scalar::Float64(_) => None,
        other => other.as_i128(),
    }
}

/// Percentage of `part` in `whole`.
pub(crate) fn percent_of(part: Option<f64>, whole: Option<f64>) -> Scalar {
    match (part, whole) {
        (Some(p), Some(w)) if w != 0.0 => Scalar::Float64(p / w * 100.0),
        _ => Scalar::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(v: f64) -> Scalar {
        Scalar::Float64(v)
    }

    #[test]
    fn test_names() {
        assert_eq!(Aggregate::from_name("avg").unwrap(), Aggregate::Mean);
        assert_eq!(Aggregate::from_name("high").unwrap(), Aggregate::Max);
        assert_eq!(
            Aggregate::from_name("median-ish"),
            Err(Error::unknown_aggregate("median-ish"))
        );
        assert_eq!(Aggregate::Sum.name(), "sum");
    }

    #[test]
    fn test_output_types() {
        assert_eq!(Aggregate::Count.output_type(DataType::String), DataType::Int64);
        assert_eq!(Aggregate::Mean.output_type(DataType::Int32), DataType::Float64);
        assert_eq!(Aggregate::Sum.output_type(DataType::Int32), DataType::Int64);
        assert_eq!(Aggregate::Min.output_type(DataType::Date), DataType::Date);
    }

    #[test]
    fn test_sum_and_retract() {
        let mut state = AggState::new(Aggregate::Sum);
        state.add(&f(10.0), &Scalar::Null);
        state.add(&f(5.0), &Scalar::Null);
        state.add(&Scalar::Null, &Scalar::Null);
        assert_eq!(state.value(Aggregate::Sum, DataType::Float64), f(15.0));
        state.retract(&f(5.0), &Scalar::Null);
        assert_eq!(state.value(Aggregate::Sum, DataType::Float64), f(10.0));
        state.retract(&f(10.0), &Scalar::Null);
        assert_eq!(state.value(Aggregate::Sum, DataType::Float64), Scalar::Null);
    }

    #[test]
    fn test_shift() {
        let mut state = AggState::new(Aggregate::Mean);
        state.add(&f(10.0), &Scalar::Null);
        state.add(&f(20.0), &Scalar::Null);
        assert!(state.shift(&f(10.0)));
        assert_eq!(state.value(Aggregate::Mean, DataType::Float64), f(20.0));
        assert!(!AggState::new(Aggregate::Max).shift(&f(1.0)));
    }

    #[test]
    fn test_integer_sum() {
        let mut state = AggState::new(Aggregate::Sum);
        state.add(&Scalar::Int32(3), &Scalar::Null);
        state.add(&Scalar::Int32(4), &Scalar::Null);
        assert_eq!(state.value(Aggregate::Sum, DataType::Int32), Scalar::Int64(7));
    }

    #[test]
    fn test_large_integer_sum_is_exact() {
        let big = (1i64 << 53) + 1;
        let mut state = AggState::new(Aggregate::Sum);
        state.add(&Scalar::Int64(big), &Scalar::Null);
        state.add(&Scalar::Int64(2), &Scalar::Null);
        assert_eq!(state.value(Aggregate::Sum, DataType::Int64), Scalar::Int64(big + 2));
        assert!(state.shift(&Scalar::Int64(-1)));
        assert_eq!(state.value(Aggregate::Sum, DataType::Int64), Scalar::Int64(big + 1));
        state.retract(&Scalar::Int64(2), &Scalar::Null);
        assert_eq!(state.value(Aggregate::Sum, DataType::Int64), Scalar::Int64(big - 1));
    }

    #[test]
    fn test_count_skips_nulls() {
        let mut state = AggState::new(Aggregate::Count);
        state.add(&Scalar::str("a"), &Scalar::Null);
        state.add(&Scalar::Null, &Scalar::Null);
        assert_eq!(state.value(Aggregate::Count, DataType::String), Scalar::Int64(1));
    }

    #[test]
    fn test_mean_and_weighted() {
        let mut mean = AggState::new(Aggregate::Mean);
        for v in [10.0, 20.0, 30.0] {
            mean.add(&f(v), &Scalar::Null);
        }
        assert_eq!(mean.value(Aggregate::Mean, DataType::Float64), f(20.0));

        let mut weighted = AggState::new(Aggregate::WeightedMean);
        weighted.add(&f(10.0), &f(1.0));
        weighted.add(&f(20.0), &f(3.0));
        assert_eq!(weighted.value(Aggregate::WeightedMean, DataType::Float64), f(17.5));
        weighted.retract(&f(20.0), &f(3.0));
        assert_eq!(weighted.value(Aggregate::WeightedMean, DataType::Float64), f(10.0));
    }

    #[test]
    fn test_min_max_survive_retraction() {
        let mut state = AggState::new(Aggregate::Min);
        for v in [30, 10, 20, 10] {
            state.add(&Scalar::Int32(v), &Scalar::Null);
        }
        assert_eq!(state.value(Aggregate::Min, DataType::Int32), Scalar::Int32(10));
        assert_eq!(state.value(Aggregate::Max, DataType::Int32), Scalar::Int32(30));
        assert_eq!(state.value(Aggregate::DistinctCount, DataType::Int32), Scalar::Int64(3));

        state.retract(&Scalar::Int32(10), &Scalar::Null);
        assert_eq!(state.value(Aggregate::Min, DataType::Int32), Scalar::Int32(10));
        state.retract(&Scalar::Int32(10), &Scalar::Null);
        assert_eq!(state.value(Aggregate::Min, DataType::Int32), Scalar::Int32(20));
    }

    #[test]
    fn test_unique() {
        let mut state = AggState::new(Aggregate::Unique);
        state.add(&Scalar::str("x"), &Scalar::Null);
        state.add(&Scalar::str("x"), &Scalar::Null);
        assert_eq!(state.value(Aggregate::Unique, DataType::String), Scalar::str("x"));
        state.add(&Scalar::str("y"), &Scalar::Null);
        assert_eq!(state.value(Aggregate::Unique, DataType::String), Scalar::Null);
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(Some(25.0), Some(100.0)), f(25.0));
        assert_eq!(percent_of(Some(1.0), Some(0.0)), Scalar::Null);
        assert_eq!(percent_of(None, Some(1.0)), Scalar::Null);
    }
}
