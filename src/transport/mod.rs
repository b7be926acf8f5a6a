//! CF-008: Execution transport — how cell bodies run against a namespace.

pub mod local;

use crate::core::types::Body;

/// Runs an opaque cell body with read/write access to the namespace.
///
/// An `Err` carries the cause; the driver wraps it into
/// [`FlowError::ComputationFailed`](crate::core::error::FlowError::ComputationFailed).
pub trait Executor<N: ?Sized> {
    fn run(&mut self, body: &Body, ns: &mut N) -> Result<(), String>;
}

impl<N: ?Sized, F> Executor<N> for F
where
    F: FnMut(&Body, &mut N) -> Result<(), String>,
{
    fn run(&mut self, body: &Body, ns: &mut N) -> Result<(), String> {
        self(body, ns)
    }
}

/// Output from executing a script.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
