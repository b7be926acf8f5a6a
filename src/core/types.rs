//! CF-001: Core types — cell bodies, fingerprints, dependency paths,
//! the `cellflow.yaml` schema, and trace events.
//!
//! All flow-file types derive Serialize/Deserialize for YAML roundtripping.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Cell bodies and fingerprints
// ============================================================================

/// Opaque computation body. The core never looks inside; it only hands
/// the body to an [`Executor`](crate::transport::Executor).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Body(Arc<str>);

impl Body {
    pub fn new(code: impl AsRef<str>) -> Self {
        Body(Arc::from(code.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::new(s)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::new(s)
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content digest of a variable's value, rendered as `"blake3:{hex}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub(crate) fn from_hash(hash: blake3::Hash) -> Self {
        Fingerprint(format!("blake3:{}", hash.to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Dependency paths
// ============================================================================

/// One dependency chain `root -> ... -> target`.
///
/// For every adjacent pair `(a, b)`, `a` is an input of the cell producing `b`.
/// The resolution driver consumes a path from the front until only the
/// target is left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarPath(VecDeque<String>);

impl VarPath {
    pub fn single(target: impl Into<String>) -> Self {
        VarPath(VecDeque::from([target.into()]))
    }

    pub fn from_vars<I, S>(vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VarPath(vars.into_iter().map(Into::into).collect())
    }

    /// New path with `dep` prepended.
    pub fn extended(&self, dep: &str) -> Self {
        let mut vars = self.0.clone();
        vars.push_front(dep.to_string());
        VarPath(vars)
    }

    pub fn head(&self) -> Option<&str> {
        self.0.front().map(String::as_str)
    }

    /// The variable right after the head: the next one to (re)compute.
    pub fn next(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    pub fn target(&self) -> Option<&str> {
        self.0.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, var: &str) -> bool {
        self.0.iter().any(|v| v == var)
    }

    pub fn position(&self, var: &str) -> Option<usize> {
        self.0.iter().position(|v| v == var)
    }

    /// Drop the satisfied head.
    pub fn advance(&mut self) -> Option<String> {
        self.0.pop_front()
    }

    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for VarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for v in &self.0 {
            if !first {
                f.write_str(" -> ")?;
            }
            f.write_str(v)?;
            first = false;
        }
        Ok(())
    }
}

// ============================================================================
// Top-level cellflow.yaml
// ============================================================================

/// A flow file: initial variables, cell declarations and the steps to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Human-readable flow name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Initial namespace bindings
    #[serde(default)]
    pub vars: IndexMap<String, serde_json::Value>,

    /// Cell declarations, registered in order (last registration wins)
    #[serde(default)]
    pub cells: Vec<CellDecl>,

    /// Steps executed by `cellflow run`
    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub policy: Policy,
}

/// A registration directive: `on: "a, b -> c"` plus the cell body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellDecl {
    /// Directive line: inputs, `->`, outputs
    pub on: String,

    /// Cell body handed to the executor
    pub code: String,
}

/// One step of a flow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    /// Rebind variables in the namespace.
    Set { set: IndexMap<String, serde_json::Value> },

    /// Bring targets up to date, then run `then` unconditionally.
    Compute {
        compute: String,
        #[serde(default)]
        then: Option<String>,
    },
}

/// Run policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Print the trace after every compute step
    #[serde(default)]
    pub verbose: bool,

    /// Append trace events to this JSONL file
    #[serde(default)]
    pub trace_file: Option<String>,

    /// Interpreter for cell bodies
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            verbose: false,
            trace_file: None,
            shell: default_shell(),
        }
    }
}

fn default_shell() -> String {
    "bash".to_string()
}

// ============================================================================
// Trace events
// ============================================================================

/// One decision taken while expanding or resolving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    PathDiscovered {
        path: String,
    },
    Examining {
        variable: String,
        path: String,
    },
    InputChanged {
        input: String,
        variable: String,
    },
    InputUnbound {
        input: String,
        variable: String,
    },
    InputUnfingerprintable {
        input: String,
        reason: String,
    },
    Skipped {
        variable: String,
        reason: SkipReason,
    },
    SharedTarget {
        variable: String,
        other_path: String,
        blocking: bool,
    },
    Deferred {
        variable: String,
        path: String,
    },
    Computing {
        variable: String,
        outputs: Vec<String>,
    },
    Trailing,
    Finished {
        computed: Vec<String>,
        passes: usize,
    },
}

/// Why a computation was not needed through a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Unchanged,
    AlreadyComputed,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::PathDiscovered { path } => write!(f, "path: {}", path),
            TraceEvent::Examining { variable, path } => {
                write!(f, "looking at variable {} in path: {}", variable, path)
            }
            TraceEvent::InputChanged { input, variable } => {
                write!(f, "variable {} has changed (input of {})", input, variable)
            }
            TraceEvent::InputUnbound { input, variable } => {
                write!(f, "variable {} is unbound (input of {})", input, variable)
            }
            TraceEvent::InputUnfingerprintable { input, reason } => {
                write!(f, "variable {} cannot be fingerprinted: {}", input, reason)
            }
            TraceEvent::Skipped { variable, reason } => match reason {
                SkipReason::Unchanged => {
                    write!(f, "no computation required for {}", variable)
                }
                SkipReason::AlreadyComputed => {
                    write!(f, "no computation required for {} (already computed)", variable)
                }
            },
            TraceEvent::SharedTarget {
                variable,
                other_path,
                blocking,
            } => {
                if *blocking {
                    write!(
                        f,
                        "variable {} is also in path: {}; other variables have to be computed first",
                        variable, other_path
                    )
                } else {
                    write!(
                        f,
                        "variable {} is also in path: {}; which doesn't prevent computing it",
                        variable, other_path
                    )
                }
            }
            TraceEvent::Deferred { variable, path } => {
                write!(f, "deferring {} in path: {}", variable, path)
            }
            TraceEvent::Computing { variable, outputs } => {
                write!(f, "computing {} (outputs: {})", variable, outputs.join(", "))
            }
            TraceEvent::Trailing => f.write_str("running trailing body"),
            TraceEvent::Finished { computed, passes } => {
                if computed.is_empty() {
                    write!(f, "all done, nothing computed ({} passes)", passes)
                } else {
                    write!(
                        f,
                        "all done, computed: {} ({} passes)",
                        computed.join(", "),
                        passes
                    )
                }
            }
        }
    }
}

/// Timestamped event wrapper for the JSONL trace file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: TraceEvent,
}

// ============================================================================
// Compute result
// ============================================================================

/// Outcome of one resolution call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputeReport {
    /// Variables whose cell ran, in execution order (the requested variable
    /// of each execution, not every co-output).
    pub executed: Vec<String>,

    /// Number of passes over the path list.
    pub passes: usize,
}

impl ComputeReport {
    pub fn is_up_to_date(&self) -> bool {
        self.executed.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
