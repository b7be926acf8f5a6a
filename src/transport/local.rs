//! CF-009: Local shell executor.
//!
//! Cell bodies are shell scripts. Every bound variable with a shell-safe
//! name is exported into the script's environment, except names the process
//! already inherits (`PATH`, `HOME`, ...), which are left alone; each stdout line of the
//! form `name=value` binds `name` in the namespace (the value is parsed as
//! JSON when possible, otherwise kept as a string). Other stdout lines are
//! kept as the transcript.

use super::{ExecOutput, Executor};
use crate::core::namespace::{value_to_string, VarStore};
use crate::core::parser::is_identifier;
use crate::core::types::Body;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

static BINDING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=(.*)$").expect("binding pattern is valid")
});

/// Execute a script by piping it to `shell` on stdin, with extra
/// environment variables.
pub fn exec_local<'a, I>(shell: &str, script: &str, env: I) -> Result<ExecOutput, String>
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let mut child = Command::new(shell)
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn {}: {}", shell, e))?;

    // A script may exit before reading all of itself; that is not a failure
    let write_result = match child.stdin.as_mut() {
        Some(stdin) => match stdin.write_all(script.as_bytes()) {
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        },
        None => Ok(()),
    };

    // Always reap the child, even when the write failed
    let output = child
        .wait_with_output()
        .map_err(|e| format!("wait error: {}", e))?;
    write_result.map_err(|e| format!("stdin write error: {}", e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Split a stdout line into a namespace binding, if it is one.
pub fn parse_binding(line: &str) -> Option<(&str, serde_json::Value)> {
    let caps = BINDING.captures(line)?;
    let name = caps.get(1)?.as_str();
    let raw = caps.get(2)?.as_str();
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Some((name, value))
}

/// Runs cell bodies through a local shell.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    transcript: Vec<String>,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            transcript: Vec::new(),
        }
    }

    /// Non-binding stdout lines collected since the last call.
    pub fn take_transcript(&mut self) -> Vec<String> {
        std::mem::take(&mut self.transcript)
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("bash")
    }
}

impl Executor<VarStore> for ShellExecutor {
    fn run(&mut self, body: &Body, ns: &mut VarStore) -> Result<(), String> {
        let env: Vec<(&str, String)> = ns
            .iter()
            .filter(|(name, _)| is_identifier(name))
            .filter(|(name, _)| {
                let inherited = std::env::var_os(name).is_some();
                if inherited {
                    tracing::debug!(
                        target: "cellflow::shell",
                        variable = %name,
                        "not exported: would override the inherited environment"
                    );
                }
                !inherited
            })
            .map(|(name, value)| (name, value_to_string(value)))
            .collect();
        let out = exec_local(&self.shell, body.as_str(), env)?;

        // Bind before checking status: partial updates stay visible
        let mut bindings = Vec::new();
        for line in out.stdout.lines() {
            match parse_binding(line) {
                Some((name, value)) => bindings.push((name.to_string(), value)),
                None => self.transcript.push(line.to_string()),
            }
        }
        for (name, value) in bindings {
            tracing::debug!(target: "cellflow::shell", variable = %name, "bound");
            ns.set(name, value);
        }

        if !out.success() {
            return Err(format!("exit code {}: {}", out.exit_code, out.stderr.trim()));
        }
        Ok(())
    }
}
