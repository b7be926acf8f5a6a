//! CF-010: Directive and flow-file parsing and validation.
//!
//! Directives are the two one-line forms users type:
//! - registration: `a, b -> c, d` (inputs, optional `->`, outputs)
//! - resolution: `c, d` (targets)
//!
//! Items are separated by commas and/or whitespace.
//!
//! Flow files (`cellflow.yaml`) are validated for:
//! - Version must be "1.0"
//! - Non-empty name
//! - Every cell declares at least one output
//! - Variable names are identifiers
//! - Compute steps name at least one target

use super::error::FlowError;
use super::types::*;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Whether `name` can be a variable name (and a shell variable).
pub fn is_identifier(name: &str) -> bool {
    IDENT.is_match(name)
}

fn split_names(text: &str) -> Vec<String> {
    text.replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Parse a registration directive into `(inputs, outputs)`.
///
/// Without `->` every name is an input and there are no outputs.
pub fn parse_onchange(line: &str) -> (Vec<String>, Vec<String>) {
    match line.find("->") {
        Some(i) => (split_names(&line[..i]), split_names(&line[i + 2..])),
        None => (split_names(line), Vec::new()),
    }
}

/// Parse a resolution directive into target names.
pub fn parse_targets(line: &str) -> Vec<String> {
    split_names(line)
}

/// Parse a cellflow.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<FlowConfig, FlowError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| FlowError::Io(format!("failed to read {}: {}", path.display(), e)))?;
    parse_config(&content)
}

/// Parse a cellflow.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<FlowConfig, FlowError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| FlowError::Parse(format!("YAML: {}", e)))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &FlowConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(ValidationError {
            message: format!("version must be \"1.0\", got \"{}\"", config.version),
        });
    }

    if config.name.is_empty() {
        errors.push(ValidationError {
            message: "name must not be empty".to_string(),
        });
    }

    for name in config.vars.keys() {
        if !is_identifier(name) {
            errors.push(ValidationError {
                message: format!("var '{}' is not a valid variable name", name),
            });
        }
    }

    for (i, cell) in config.cells.iter().enumerate() {
        let (inputs, outputs) = parse_onchange(&cell.on);
        if outputs.is_empty() {
            errors.push(ValidationError {
                message: format!("cell {} ('{}') declares no outputs", i + 1, cell.on),
            });
        }
        for name in inputs.iter().chain(outputs.iter()) {
            if !is_identifier(name) {
                errors.push(ValidationError {
                    message: format!(
                        "cell {} ('{}'): '{}' is not a valid variable name",
                        i + 1,
                        cell.on,
                        name
                    ),
                });
            }
        }
    }

    for (i, step) in config.steps.iter().enumerate() {
        match step {
            Step::Compute { compute, .. } => {
                let targets = parse_targets(compute);
                if targets.is_empty() {
                    errors.push(ValidationError {
                        message: format!("step {}: compute names no targets", i + 1),
                    });
                }
                for t in targets.iter().filter(|t| !is_identifier(t)) {
                    errors.push(ValidationError {
                        message: format!(
                            "step {}: '{}' is not a valid variable name",
                            i + 1,
                            t
                        ),
                    });
                }
            }
            Step::Set { set } => {
                for name in set.keys().filter(|n| !is_identifier(n)) {
                    errors.push(ValidationError {
                        message: format!(
                            "step {}: '{}' is not a valid variable name",
                            i + 1,
                            name
                        ),
                    });
                }
            }
        }
    }

    errors
}

/// Non-fatal observations: outputs declared by more than one cell
/// (the later declaration wins).
pub fn config_notes(config: &FlowConfig) -> Vec<String> {
    let mut notes = Vec::new();
    let mut declared: indexmap::IndexMap<String, usize> = indexmap::IndexMap::new();
    for (i, cell) in config.cells.iter().enumerate() {
        let (_, outputs) = parse_onchange(&cell.on);
        for out in outputs {
            if let Some(prev) = declared.insert(out.clone(), i + 1) {
                notes.push(format!(
                    "output '{}' of cell {} replaces the rule from cell {}",
                    out,
                    i + 1,
                    prev
                ));
            }
        }
    }
    notes
}
