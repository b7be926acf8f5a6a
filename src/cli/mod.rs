//! CF-013: CLI subcommands — init, validate, plan, run.

use crate::core::engine::Engine;
use crate::core::namespace::VarStore;
use crate::core::types::{Body, FlowConfig, Step};
use crate::core::{parser, types};
use crate::transport::local::ShellExecutor;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new cellflow project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate cellflow.yaml without running anything
    Validate {
        /// Path to cellflow.yaml
        #[arg(short, long, default_value = "cellflow.yaml")]
        file: PathBuf,
    },

    /// Show every dependency path for the targets (no execution)
    Plan {
        /// Path to cellflow.yaml
        #[arg(short, long, default_value = "cellflow.yaml")]
        file: PathBuf,

        /// Targets, e.g. "c, d"
        #[arg(short, long)]
        targets: String,
    },

    /// Run the flow's steps, recomputing only stale cells
    Run {
        /// Path to cellflow.yaml
        #[arg(short, long, default_value = "cellflow.yaml")]
        file: PathBuf,

        /// Print the decision trace after every compute step
        #[arg(long)]
        show_trace: bool,

        /// Append trace events to a JSONL file
        #[arg(long)]
        trace_file: Option<PathBuf>,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan { file, targets } => cmd_plan(&file, &targets),
        Commands::Run {
            file,
            show_trace,
            trace_file,
        } => cmd_run(&file, show_trace, trace_file),
    }
}

const TEMPLATE: &str = r#"version: "1.0"
name: my-flow
description: "Managed by cellflow"

vars:
  a: 1

cells:
  - on: "a -> b"
    code: |
      echo "b=$((a * 2))"
  - on: "b -> c"
    code: |
      echo "c=$((b + 1))"

steps:
  - compute: c
    then: echo "c is $c"
  - set: { a: 5 }
  - compute: c
    then: echo "c is $c"

policy:
  verbose: false
  shell: bash
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("cellflow.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&config_path, TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized cellflow project at {}", path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);

    if errors.is_empty() {
        for note in parser::config_notes(&config) {
            println!("  NOTE: {}", note);
        }
        println!(
            "OK: {} ({} cells, {} steps)",
            config.name,
            config.cells.len(),
            config.steps.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Parse and validate a flow file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<FlowConfig, String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("validation failed".to_string())
}

/// Register every cell of the flow, in declaration order.
fn build_engine(config: &FlowConfig) -> Engine {
    let mut engine = Engine::new();
    for cell in &config.cells {
        engine.onchange(&cell.on, cell.code.as_str());
    }
    engine
}

fn cmd_plan(file: &Path, targets: &str) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    let mut engine = build_engine(&config);
    let targets = parser::parse_targets(targets);
    if targets.is_empty() {
        return Err("no targets given".to_string());
    }

    let paths = engine.plan(targets.as_slice())?;
    println!("The data flow consists of the following paths:");
    for path in &paths {
        println!("  {}", path);
    }
    println!();
    println!("Plan: {} path(s) to {}.", paths.len(), targets.join(", "));
    Ok(())
}

fn cmd_run(file: &Path, show_trace: bool, trace_file: Option<PathBuf>) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    let mut engine = build_engine(&config);
    let mut ns: VarStore = config.vars.clone().into_iter().collect();
    let mut exec = ShellExecutor::new(config.policy.shell.as_str());

    let show_trace = show_trace || config.policy.verbose;
    let trace_file = trace_file.or_else(|| config.policy.trace_file.as_ref().map(PathBuf::from));

    println!(
        "Running: {} ({} cells, {} steps)",
        config.name,
        config.cells.len(),
        config.steps.len()
    );

    let mut total_computed = 0;
    for (i, step) in config.steps.iter().enumerate() {
        match step {
            Step::Set { set } => {
                for (name, value) in set {
                    ns.set(name.clone(), value.clone());
                }
                let names: Vec<&str> = set.keys().map(String::as_str).collect();
                println!("[{}] set {}", i + 1, names.join(", "));
            }
            Step::Compute { compute, then } => {
                let trailing = then.as_deref().map(Body::from);
                let result = engine.compute_directive(compute, &mut ns, &mut exec, trailing.as_ref());

                for line in exec.take_transcript() {
                    println!("    {}", line);
                }
                if show_trace {
                    print_trace(engine.trace().render().as_str());
                }
                if let Some(ref path) = trace_file {
                    engine.trace().append_jsonl(path)?;
                }

                let report = result.map_err(|e| format!("step {}: {}", i + 1, e))?;
                total_computed += report.executed.len();
                println!("[{}] compute {}: {}", i + 1, compute.trim(), describe_report(&report));
            }
        }
    }

    println!();
    println!("Run complete: {} cell execution(s).", total_computed);
    Ok(())
}

/// One-line summary of a compute step.
fn describe_report(report: &types::ComputeReport) -> String {
    if report.is_up_to_date() {
        "up to date".to_string()
    } else {
        format!("computed {}", report.executed.join(", "))
    }
}

fn print_trace(trace: &str) {
    for line in trace.lines() {
        println!("    | {}", line);
    }
}
