//! Row filters.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use rill_core::{Error, Result, Scalar};

/// Filter operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    BeginsWith,
    EndsWith,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    pub fn from_name(name: &str) -> Result<FilterOp> {
        Ok(match name {
            "==" => FilterOp::Eq,
            "!=" => FilterOp::Ne,
            "<" => FilterOp::Lt,
            "<=" => FilterOp::Le,
            ">" => FilterOp::Gt,
            ">=" => FilterOp::Ge,
            "contains" => FilterOp::Contains,
            "begins with" => FilterOp::BeginsWith,
            "ends with" => FilterOp::EndsWith,
            "in" => FilterOp::In,
            "not in" => FilterOp::NotIn,
            "is null" => FilterOp::IsNull,
            "is not null" => FilterOp::IsNotNull,
            other => return Err(Error::unknown_filter_op(other)),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Contains => "contains",
            FilterOp::BeginsWith => "begins with",
            FilterOp::EndsWith => "ends with",
            FilterOp::In => "in",
            FilterOp::NotIn => "not in",
            FilterOp::IsNull => "is null",
            FilterOp::IsNotNull => "is not null",
        }
    }

    /// Whether the operator takes no operand.
    #[inline]
    pub fn is_unary(&self) -> bool {
        matches!(self, FilterOp::IsNull | FilterOp::IsNotNull)
    }
}

/// How filter terms are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn from_name(name: &str) -> Result<Combinator> {
        match name {
            "and" => Ok(Combinator::And),
            "or" => Ok(Combinator::Or),
            other => Err(Error::invalid_config(alloc::format!(
                "unknown filter combinator: {}",
                other
            ))),
        }
    }
}

/// One `column op operand` predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterTerm {
    pub column: String,
    pub op: FilterOp,
    /// One operand for comparisons, any number for `in` / `not in`.
    pub operands: Vec<Scalar>,
}

impl FilterTerm {
    pub fn new(column: &str, op: FilterOp, operand: Scalar) -> Self {
        Self {
            column: column.to_string(),
            op,
            operands: alloc::vec![operand],
        }
    }

    pub fn unary(column: &str, op: FilterOp) -> Self {
        Self {
            column: column.to_string(),
            op,
            operands: Vec::new(),
        }
    }

    pub fn in_set(column: &str, negate: bool, operands: Vec<Scalar>) -> Self {
        Self {
            column: column.to_string(),
            op: if negate { FilterOp::NotIn } else { FilterOp::In },
            operands,
        }
    }

    /// Tests a cell against the predicate. Null cells only match `is null`.
    pub fn matches(&self, value: &Scalar) -> bool {
        match self.op {
            FilterOp::IsNull => return value.is_null(),
            FilterOp::IsNotNull => return value.is_valid(),
            _ => {}
        }
        if value.is_null() {
            return false;
        }
        let operand = self.operands.first().unwrap_or(&Scalar::Null);
        match self.op {
            FilterOp::Eq => value == operand,
            FilterOp::Ne => value != operand,
            FilterOp::Lt => value.cmp(operand) == Ordering::Less,
            FilterOp::Le => value.cmp(operand) != Ordering::Greater,
            FilterOp::Gt => value.cmp(operand) == Ordering::Greater,
            FilterOp::Ge => value.cmp(operand) != Ordering::Less,
            FilterOp::Contains => str_pair(value, operand).map_or(false, |(v, o)| v.contains(o)),
            FilterOp::BeginsWith => str_pair(value, operand).map_or(false, |(v, o)| v.starts_with(o)),
            FilterOp::EndsWith => str_pair(value, operand).map_or(false, |(v, o)| v.ends_with(o)),
            FilterOp::In => self.operands.contains(value),
            FilterOp::NotIn => !self.operands.contains(value),
            FilterOp::IsNull | FilterOp::IsNotNull => false,
        }
    }
}

fn str_pair<'a>(value: &'a Scalar, operand: &'a Scalar) -> Option<(&'a str, &'a str)> {
    Some((value.as_str()?, operand.as_str()?))
}

/// A set of terms and their combinator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub terms: Vec<FilterTerm>,
    pub combinator: Combinator,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluates the filter; `cell(i)` returns the value of term `i`'s
    /// column. An empty filter matches everything.
    pub fn matches(&self, mut cell: impl FnMut(usize) -> Scalar) -> bool {
        if self.terms.is_empty() {
            return true;
        }
        match self.combinator {
            Combinator::And => self
                .terms
                .iter()
                .enumerate()
                .all(|(i, term)| term.matches(&cell(i))),
            Combinator::Or => self
                .terms
                .iter()
                .enumerate()
                .any(|(i, term)| term.matches(&cell(i))),
        }
    }
}
