//! CF-012: Engine — registration and compute orchestration.
//!
//! compute = expand targets → resolve paths → run the trailing body.
//! The trace of the latest call stays available until the next one.

use super::driver;
use super::error::FlowError;
use super::expander;
use super::namespace::Namespace;
use super::parser;
use super::registry::{CellId, Registry};
use super::types::{Body, ComputeReport, TraceEvent, VarPath};
use crate::transport::Executor;
use crate::tripwire::tracelog::TraceLog;

/// Variable name reported when a trailing body fails.
pub const TRAILING: &str = "<trailing>";

/// Owns the rule registry and the trace of the latest call.
#[derive(Debug, Default)]
pub struct Engine {
    registry: Registry,
    trace: TraceLog,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `body` computes `outputs` from `inputs`.
    pub fn register<I, O, S, T>(&mut self, inputs: I, outputs: O, body: Body) -> Option<CellId>
    where
        I: IntoIterator<Item = S>,
        O: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        self.registry.register(inputs, outputs, body)
    }

    /// Register from a directive line such as `a, b -> c, d`.
    pub fn onchange(&mut self, line: &str, body: impl Into<Body>) -> Option<CellId> {
        let (inputs, outputs) = parser::parse_onchange(line);
        self.registry.register(inputs, outputs, body.into())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Trace of the latest `plan` or `compute` call.
    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    /// Expand `targets` without executing anything.
    pub fn plan<S: AsRef<str>>(&mut self, targets: &[S]) -> Result<Vec<VarPath>, FlowError> {
        self.trace = TraceLog::new();
        expander::expand(&self.registry, targets, &mut self.trace)
    }

    /// Bring `targets` up to date, then run `trailing` unconditionally.
    pub fn compute<S, N, E>(
        &mut self,
        targets: &[S],
        ns: &mut N,
        exec: &mut E,
        trailing: Option<&Body>,
    ) -> Result<ComputeReport, FlowError>
    where
        S: AsRef<str>,
        N: Namespace + ?Sized,
        E: Executor<N> + ?Sized,
    {
        self.trace = TraceLog::new();
        let mut paths = expander::expand(&self.registry, targets, &mut self.trace)?;
        let report = driver::resolve(
            &mut self.registry,
            &mut paths,
            ns,
            exec,
            &mut self.trace,
        )?;

        if let Some(body) = trailing {
            self.trace.push(TraceEvent::Trailing);
            exec.run(body, ns)
                .map_err(|cause| FlowError::ComputationFailed {
                    variable: TRAILING.to_string(),
                    cause,
                })?;
        }
        tracing::info!(
            executed = report.executed.len(),
            passes = report.passes,
            "compute finished"
        );
        Ok(report)
    }

    /// Compute from a directive line such as `c, d`.
    pub fn compute_directive<N, E>(
        &mut self,
        line: &str,
        ns: &mut N,
        exec: &mut E,
        trailing: Option<&Body>,
    ) -> Result<ComputeReport, FlowError>
    where
        N: Namespace + ?Sized,
        E: Executor<N> + ?Sized,
    {
        let targets = parser::parse_targets(line);
        self.compute(targets.as_slice(), ns, exec, trailing)
    }
}
