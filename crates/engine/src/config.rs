//! Engine configuration and the fault boundary.

use alloc::string::{String, ToString};
use rill_core::{Error, Result};
use rill_incremental::GnodeOptions;

/// What happens when a batch hits an internal invariant violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Panic with the violation.
    Abort,
    /// Return `Error::Fault` to the caller.
    Report,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            FaultPolicy::Abort
        } else {
            FaultPolicy::Report
        }
    }
}

impl FaultPolicy {
    /// Passes configuration errors through and turns invariant violations
    /// into a panic or an `Error::Fault`.
    pub fn settle<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Err(err) if err.is_invariant() => {
                log::error!("invariant violation, table faulted: {}", err);
                match self {
                    FaultPolicy::Abort => panic!("rill: {}", err),
                    FaultPolicy::Report => Err(Error::fault(err.to_string())),
                }
            }
            other => other,
        }
    }
}

/// Configuration shared by a table and its views.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Joins pivot values in column paths.
    pub separator: String,
    pub fault_policy: FaultPolicy,
    /// Whether new views record step deltas.
    pub deltas_enabled: bool,
    /// Ring-buffer capacity of tables without an index column.
    pub limit: Option<usize>,
    pub gnode: GnodeOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            separator: "|".to_string(),
            fault_policy: FaultPolicy::default(),
            deltas_enabled: false,
            limit: None,
            gnode: GnodeOptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn deltas_enabled(mut self, enabled: bool) -> Self {
        self.deltas_enabled = enabled;
        self
    }

    /// Keeps at most `limit` rows; row `n` overwrites row `n - limit`.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn gnode_options(mut self, options: GnodeOptions) -> Self {
        self.gnode = options;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.separator.is_empty() {
            return Err(Error::invalid_config("column path separator is empty"));
        }
        if self.limit == Some(0) {
            return Err(Error::invalid_config("row limit must be positive"));
        }
        Ok(())
    }
}
