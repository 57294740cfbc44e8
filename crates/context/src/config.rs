//! View configuration.
//!
//! `ViewConfig` is the user-facing builder; `ResolvedConfig` is the same
//! configuration checked against a table schema, with defaults filled in.
//! Every configuration error surfaces from `resolve`, before any context
//! state exists.

use crate::aggregate::Aggregate;
use crate::filter::{Combinator, Filter, FilterTerm};
use crate::sort::SortSpec;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use rill_core::{DataType, Error, Result, Schema, PSP_PKEY};

/// One aggregate column of a pivoted view.
#[derive(Clone, Debug, PartialEq)]
pub struct AggSpec {
    /// Output name; defaults to the input column name.
    pub name: String,
    pub column: String,
    pub aggregate: Aggregate,
    /// Weight column of `weighted mean`.
    pub weight: Option<String>,
}

impl AggSpec {
    pub fn new(column: &str, aggregate: Aggregate) -> Self {
        Self {
            name: column.to_string(),
            column: column.to_string(),
            aggregate,
            weight: None,
        }
    }

    /// Weighted mean of `column` by `weight`.
    pub fn weighted(column: &str, weight: &str) -> Self {
        Self {
            weight: Some(weight.to_string()),
            ..Self::new(column, Aggregate::WeightedMean)
        }
    }

    /// Parses the aggregate by name.
    pub fn parse(column: &str, aggregate: &str) -> Result<Self> {
        Ok(Self::new(column, Aggregate::from_name(aggregate)?))
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

/// Configuration of a view: pivots, aggregates, filters and sorts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewConfig {
    pub row_pivots: Vec<String>,
    pub column_pivots: Vec<String>,
    /// Visible columns; empty means every table column.
    pub columns: Vec<String>,
    /// Aggregate overrides; columns without one use `Aggregate::default_for`.
    pub aggregates: Vec<AggSpec>,
    pub filter: Filter,
    pub sorts: Vec<SortSpec>,
    pub column_sorts: Vec<SortSpec>,
    pub row_depth: Option<usize>,
    pub column_depth: Option<usize>,
}

impl ViewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_pivot(mut self, column: &str) -> Self {
        self.row_pivots.push(column.to_string());
        self
    }

    pub fn column_pivot(mut self, column: &str) -> Self {
        self.column_pivots.push(column.to_string());
        self
    }

    pub fn column(mut self, column: &str) -> Self {
        self.columns.push(column.to_string());
        self
    }

    pub fn aggregate(mut self, spec: AggSpec) -> Self {
        self.aggregates.push(spec);
        self
    }

    pub fn filter(mut self, term: FilterTerm) -> Self {
        self.filter.terms.push(term);
        self
    }

    pub fn filter_combinator(mut self, combinator: Combinator) -> Self {
        self.filter.combinator = combinator;
        self
    }

    pub fn sort(mut self, spec: SortSpec) -> Self {
        self.sorts.push(spec);
        self
    }

    pub fn column_sort(mut self, spec: SortSpec) -> Self {
        self.column_sorts.push(spec);
        self
    }

    pub fn row_depth(mut self, depth: usize) -> Self {
        self.row_depth = Some(depth);
        self
    }

    pub fn column_depth(mut self, depth: usize) -> Self {
        self.column_depth = Some(depth);
        self
    }

    /// Column pivots without row pivots.
    pub fn is_column_only(&self) -> bool {
        self.row_pivots.is_empty() && !self.column_pivots.is_empty()
    }

    /// Number of pivot axes.
    pub fn sides(&self) -> usize {
        if !self.column_pivots.is_empty() {
            2
        } else if !self.row_pivots.is_empty() {
            1
        } else {
            0
        }
    }

    /// Checks the configuration against `schema` and fills in defaults.
    pub fn resolve(&self, schema: &Schema) -> Result<ResolvedConfig> {
        let require = |name: &str| -> Result<DataType> { schema.dtype_of(name) };

        for pivot in self.row_pivots.iter().chain(self.column_pivots.iter()) {
            require(pivot)?;
        }
        for term in &self.filter.terms {
            require(&term.column)?;
            if !term.op.is_unary()
                && !matches!(term.op, crate::filter::FilterOp::In | crate::filter::FilterOp::NotIn)
                && term.operands.len() != 1
            {
                return Err(Error::invalid_config(alloc::format!(
                    "filter `{} {}` takes exactly one operand",
                    term.column,
                    term.op.name()
                )));
            }
        }

        let columns: Vec<String> = if self.columns.is_empty() {
            schema
                .without_internal()
                .names()
                .iter()
                .filter(|n| self.sides() == 0 || !self.row_pivots.contains(n))
                .cloned()
                .collect()
        } else {
            for column in &self.columns {
                require(column)?;
            }
            self.columns.clone()
        };

        let mut aggs = Vec::new();
        for column in &columns {
            let spec = match self.aggregates.iter().find(|a| &a.column == column) {
                Some(spec) => spec.clone(),
                None => AggSpec::new(column, Aggregate::default_for(require(column)?)),
            };
            aggs.push(resolve_agg(spec, schema, false)?);
        }
        for spec in &self.aggregates {
            if !aggs.iter().any(|a: &ResolvedAgg| a.spec.name == spec.name) {
                aggs.push(resolve_agg(spec.clone(), schema, false)?);
            }
        }

        let mut hidden_sort = Vec::new();
        for sort in self.sorts.iter().chain(self.column_sorts.iter()) {
            let visible = columns.contains(&sort.column) || aggs.iter().any(|a| a.spec.name == sort.column);
            if !visible && !hidden_sort.contains(&sort.column) {
                let dtype = require(&sort.column)?;
                hidden_sort.push(sort.column.clone());
                let spec = AggSpec::new(&sort.column, Aggregate::default_for(dtype));
                aggs.push(resolve_agg(spec, schema, true)?);
            }
        }

        let column_only = self.is_column_only();
        let row_pivots = if column_only {
            alloc::vec![PSP_PKEY.to_string()]
        } else {
            self.row_pivots.clone()
        };
        let row_depth = if column_only {
            1
        } else {
            self.row_depth.unwrap_or(row_pivots.len())
        };
        let column_depth = self.column_depth.unwrap_or(self.column_pivots.len());

        Ok(ResolvedConfig {
            row_pivots,
            column_pivots: self.column_pivots.clone(),
            columns,
            hidden_sort,
            aggs,
            filter: self.filter.clone(),
            sorts: self.sorts.clone(),
            column_sorts: self.column_sorts.clone(),
            row_depth,
            column_depth,
            column_only,
        })
    }
}

fn resolve_agg(spec: AggSpec, schema: &Schema, hidden: bool) -> Result<ResolvedAgg> {
    let input_type = schema.dtype_of(&spec.column)?;
    match (&spec.weight, spec.aggregate.is_weighted()) {
        (Some(weight), true) => {
            schema.dtype_of(weight)?;
        }
        (None, true) => {
            return Err(Error::invalid_config(alloc::format!(
                "weighted mean of {} needs a weight column",
                spec.column
            )))
        }
        _ => {}
    }
    Ok(ResolvedAgg {
        spec,
        input_type,
        hidden,
    })
}

/// An aggregate checked against the schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedAgg {
    pub spec: AggSpec,
    pub input_type: DataType,
    /// Present only to back a sort on a column that is not displayed.
    pub hidden: bool,
}

impl ResolvedAgg {
    #[inline]
    pub fn aggregate(&self) -> Aggregate {
        self.spec.aggregate
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Type of the aggregate's output.
    pub fn output_type(&self) -> DataType {
        self.spec.aggregate.output_type(self.input_type)
    }
}

/// A `ViewConfig` validated against a schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConfig {
    /// Row pivots; a column-only view pivots on `psp_pkey`.
    pub row_pivots: Vec<String>,
    pub column_pivots: Vec<String>,
    pub columns: Vec<String>,
    pub hidden_sort: Vec<String>,
    pub aggs: Vec<ResolvedAgg>,
    pub filter: Filter,
    pub sorts: Vec<SortSpec>,
    pub column_sorts: Vec<SortSpec>,
    pub row_depth: usize,
    pub column_depth: usize,
    pub column_only: bool,
}

impl ResolvedConfig {
    pub fn sides(&self) -> usize {
        if !self.column_pivots.is_empty() {
            2
        } else if !self.row_pivots.is_empty() {
            1
        } else {
            0
        }
    }

    /// Index of the aggregate named `name`.
    pub fn agg_index(&self, name: &str) -> Option<usize> {
        self.aggs.iter().position(|a| a.spec.name == name)
    }

    /// Re-types an input column after promotion.
    pub fn retype(&mut self, column: &str, dtype: DataType) {
        for agg in self.aggs.iter_mut().filter(|a| a.spec.column == column) {
            agg.input_type = dtype;
        }
    }
}
