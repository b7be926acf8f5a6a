//! Test executor: cell bodies are tiny arithmetic programs.
//!
//! `label: out1, out2 = x + y` binds every output to the sum of the inputs
//! (unbound inputs count as 0); `label: out = sign x` binds -1, 0 or 1.
//! The body `fail` always errors. Every run records its label.

use super::namespace::{Namespace, VarStore};
use super::types::Body;
use crate::transport::Executor;

#[derive(Debug, Default)]
pub(crate) struct SumExec {
    pub runs: Vec<String>,
}

impl SumExec {
    pub fn count(&self, label: &str) -> usize {
        self.runs.iter().filter(|r| r.as_str() == label).count()
    }
}

fn int(ns: &VarStore, name: &str) -> i64 {
    ns.get(name).and_then(|v| v.as_i64()).unwrap_or(0)
}

impl Executor<VarStore> for SumExec {
    fn run(&mut self, body: &Body, ns: &mut VarStore) -> Result<(), String> {
        let text = body.as_str();
        if text == "fail" {
            self.runs.push("fail".to_string());
            return Err("body raised".to_string());
        }

        let (label, program) = text
            .split_once(':')
            .ok_or_else(|| format!("bad test body: {}", text))?;
        self.runs.push(label.trim().to_string());

        let (outs, expr) = program
            .split_once('=')
            .ok_or_else(|| format!("bad test body: {}", text))?;
        let value = match expr.trim().strip_prefix("sign ") {
            Some(var) => int(ns, var.trim()).signum(),
            None => expr.split('+').map(|v| int(ns, v.trim())).sum(),
        };
        for out in outs.split(',') {
            ns.set(out.trim(), value);
        }
        Ok(())
    }
}
