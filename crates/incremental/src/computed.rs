//! Computed columns.
//!
//! A computed column derives its value from other master columns of the
//! same row. Its output type is a pure function of the function and the
//! input types, so a column can be declared before any row exists.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use rill_core::{DataType, Error, InvariantViolation, Result, Scalar, Schema};

/// Functions available to computed columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComputedFunction {
    Add,
    Subtract,
    Multiply,
    Divide,
    /// `x / y * 100`.
    PercentOf,
    Pow2,
    Invert,
    Sqrt,
    Abs,
    Bucket10,
    Bucket100,
    Bucket1000,
    Bucket0_1,
    Bucket0_01,
    Bucket0_001,
    Length,
    Uppercase,
    Lowercase,
    ConcatSpace,
    ConcatComma,
}

impl ComputedFunction {
    pub fn name(self) -> &'static str {
        match self {
            ComputedFunction::Add => "add",
            ComputedFunction::Subtract => "subtract",
            ComputedFunction::Multiply => "multiply",
            ComputedFunction::Divide => "divide",
            ComputedFunction::PercentOf => "percent_of",
            ComputedFunction::Pow2 => "pow2",
            ComputedFunction::Invert => "invert",
            ComputedFunction::Sqrt => "sqrt",
            ComputedFunction::Abs => "abs",
            ComputedFunction::Bucket10 => "bucket_10",
            ComputedFunction::Bucket100 => "bucket_100",
            ComputedFunction::Bucket1000 => "bucket_1000",
            ComputedFunction::Bucket0_1 => "bucket_0_1",
            ComputedFunction::Bucket0_01 => "bucket_0_0_1",
            ComputedFunction::Bucket0_001 => "bucket_0_0_0_1",
            ComputedFunction::Length => "length",
            ComputedFunction::Uppercase => "uppercase",
            ComputedFunction::Lowercase => "lowercase",
            ComputedFunction::ConcatSpace => "concat_space",
            ComputedFunction::ConcatComma => "concat_comma",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    pub const ALL: [ComputedFunction; 20] = [
        ComputedFunction::Add,
        ComputedFunction::Subtract,
        ComputedFunction::Multiply,
        ComputedFunction::Divide,
        ComputedFunction::PercentOf,
        ComputedFunction::Pow2,
        ComputedFunction::Invert,
        ComputedFunction::Sqrt,
        ComputedFunction::Abs,
        ComputedFunction::Bucket10,
        ComputedFunction::Bucket100,
        ComputedFunction::Bucket1000,
        ComputedFunction::Bucket0_1,
        ComputedFunction::Bucket0_01,
        ComputedFunction::Bucket0_001,
        ComputedFunction::Length,
        ComputedFunction::Uppercase,
        ComputedFunction::Lowercase,
        ComputedFunction::ConcatSpace,
        ComputedFunction::ConcatComma,
    ];

    /// Number of input columns.
    pub fn arity(self) -> usize {
        match self {
            ComputedFunction::Add
            | ComputedFunction::Subtract
            | ComputedFunction::Multiply
            | ComputedFunction::Divide
            | ComputedFunction::PercentOf
            | ComputedFunction::ConcatSpace
            | ComputedFunction::ConcatComma => 2,
            _ => 1,
        }
    }

    /// Output type for the given input types, or None when the function has
    /// no implementation for them.
    pub fn output_type(self, inputs: &[DataType]) -> Option<DataType> {
        use ComputedFunction::*;
        match (self, inputs) {
            (Add | Subtract | Multiply, [a, b]) if a.is_numeric() && b.is_numeric() => {
                if a.is_floating_point() || b.is_floating_point() {
                    Some(DataType::Float64)
                } else {
                    Some(DataType::Int64)
                }
            }
            (Divide | PercentOf, [a, b]) if a.is_numeric() && b.is_numeric() => {
                Some(DataType::Float64)
            }
            (
                Pow2 | Invert | Sqrt | Abs | Bucket10 | Bucket100 | Bucket1000 | Bucket0_1
                | Bucket0_01 | Bucket0_001,
                [a],
            ) if a.is_numeric() => Some(DataType::Float64),
            (Length, [DataType::String]) => Some(DataType::Int64),
            (Uppercase | Lowercase, [DataType::String]) => Some(DataType::String),
            (ConcatSpace | ConcatComma, [DataType::String, DataType::String]) => {
                Some(DataType::String)
            }
            _ => None,
        }
    }

    /// Applies the function to one row. Any null operand yields null, as
    /// does a division by zero.
    pub fn apply(self, args: &[Scalar]) -> Scalar {
        use ComputedFunction::*;
        if args.iter().any(Scalar::is_null) {
            return Scalar::Null;
        }
        match (self, args) {
            (Add | Subtract | Multiply, [x, y]) => {
                if x.data_type().map_or(false, |t| t.is_integer())
                    && y.data_type().map_or(false, |t| t.is_integer())
                {
                    let (Some(x), Some(y)) = (x.as_i128(), y.as_i128()) else {
                        return Scalar::Null;
                    };
                    let v = match self {
                        Add => x + y,
                        Subtract => x - y,
                        _ => x.wrapping_mul(y),
                    };
                    Scalar::Int64(v as i64)
                } else {
                    float2(x, y, |x, y| match self {
                        Add => x + y,
                        Subtract => x - y,
                        _ => x * y,
                    })
                }
            }
            (Divide, [x, y]) => float2(x, y, |x, y| x / y),
            (PercentOf, [x, y]) => float2(x, y, |x, y| x / y * 100.0),
            (Pow2, [x]) => float1(x, |x| x * x),
            (Invert, [x]) => float1(x, |x| 1.0 / x),
            (Sqrt, [x]) => float1(x, libm::sqrt),
            (Abs, [x]) => float1(x, libm::fabs),
            (Bucket10, [x]) => float1(x, |x| bucket(x, 10.0)),
            (Bucket100, [x]) => float1(x, |x| bucket(x, 100.0)),
            (Bucket1000, [x]) => float1(x, |x| bucket(x, 1000.0)),
            (Bucket0_1, [x]) => float1(x, |x| bucket(x, 0.1)),
            (Bucket0_01, [x]) => float1(x, |x| bucket(x, 0.01)),
            (Bucket0_001, [x]) => float1(x, |x| bucket(x, 0.001)),
            (Length, [Scalar::Str(s)]) => Scalar::Int64(s.chars().count() as i64),
            (Uppercase, [Scalar::Str(s)]) => Scalar::from(s.to_uppercase()),
            (Lowercase, [Scalar::Str(s)]) => Scalar::from(s.to_lowercase()),
            (ConcatSpace, [Scalar::Str(a), Scalar::Str(b)]) => Scalar::from(format!("{} {}", a, b)),
            (ConcatComma, [Scalar::Str(a), Scalar::Str(b)]) => {
                Scalar::from(format!("{}, {}", a, b))
            }
            _ => Scalar::Null,
        }
    }
}

fn bucket(x: f64, width: f64) -> f64 {
    libm::floor(x / width) * width
}

/// Non-finite results (division by zero, square root of a negative) are
/// stored as null.
fn finite(v: f64) -> Scalar {
    if v.is_finite() {
        Scalar::Float64(v)
    } else {
        Scalar::Null
    }
}

fn float1(x: &Scalar, f: impl Fn(f64) -> f64) -> Scalar {
    x.as_f64().map_or(Scalar::Null, |x| finite(f(x)))
}

fn float2(x: &Scalar, y: &Scalar, f: impl Fn(f64, f64) -> f64) -> Scalar {
    match (x.as_f64(), y.as_f64()) {
        (Some(x), Some(y)) => finite(f(x, y)),
        _ => Scalar::Null,
    }
}

/// A column derived from other columns of the same row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputedColumn {
    pub name: String,
    pub inputs: Vec<String>,
    pub function: ComputedFunction,
}

impl ComputedColumn {
    pub fn new(name: &str, function: ComputedFunction, inputs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            function,
        }
    }

    /// Resolves the output type against `schema`.
    ///
    /// Unknown inputs and a wrong input count are configuration errors; an
    /// input type the function cannot handle is an invariant violation.
    pub fn output_type(&self, schema: &Schema) -> Result<DataType> {
        if self.inputs.len() != self.function.arity() {
            return Err(Error::invalid_config(format!(
                "{} takes {} inputs, got {}",
                self.function.name(),
                self.function.arity(),
                self.inputs.len()
            )));
        }
        if schema.has_column(&self.name) {
            return Err(Error::duplicate_column(self.name.as_str()));
        }
        let types = self
            .inputs
            .iter()
            .map(|name| schema.dtype_of(name))
            .collect::<Result<Vec<_>>>()?;
        self.function.output_type(&types).ok_or_else(|| {
            let inputs: Vec<&str> = types.iter().map(|t| t.descr()).collect();
            InvariantViolation::NoComputation {
                function: self.function.name().to_string(),
                inputs: inputs.join(", "),
            }
            .into()
        })
    }
}
