//! `agentscript` — the CLI front door over `agentscript-sandbox` (spec §6.1,
//! spec.md §2 "All other repository code consumes the Executor through a
//! thin 'run one script' facade").
//!
//! Mirrors the teacher binary's split: `main.rs` wires up tracing and
//! dispatches to a subcommand handler, every handler returns
//! `anyhow::Result<()>` (spec §7 ambient-stack note: `anyhow` at the CLI
//! boundary, `thiserror` reserved for the library's closed taxonomy), and
//! nothing below the CLI layer ever prints on its own.

mod cli;
mod observability;

use std::path::Path;

use agentscript_core::{PolicyOverrides, SandboxSettings};
use agentscript_sandbox::{EchoToolHandler, Sandbox};
use agentscript_validator::ValidateOptions;
use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { file, json, custom_globals } => validate_cmd(&file, json, custom_globals),
        Commands::Run {
            file,
            security_level,
            json,
            custom_globals,
            timeout_ms,
            max_iterations,
            max_tool_calls,
        } => {
            run_cmd(
                &file,
                security_level.into(),
                json,
                custom_globals,
                timeout_ms,
                max_iterations,
                max_tool_calls,
            )
            .await
        }
    }
}

fn read_source(path: &str) -> Result<String> {
    std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("failed to read AgentScript source from `{path}`"))
}

/// `agentscript validate <file>` (spec §6.1, §6.5).
fn validate_cmd(file: &str, json: bool, custom_globals: Vec<String>) -> Result<()> {
    let source = read_source(file)?;
    let options = ValidateOptions {
        custom_globals,
        ..ValidateOptions::default()
    };
    let result = agentscript_validator::validate(&source, &options);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_validation_report(&result);
    }

    if !result.valid {
        std::process::exit(1);
    }
    Ok(())
}

fn print_validation_report(result: &agentscript_core::ValidationResult) {
    if let Some(parse_error) = &result.parse_error {
        println!("parse error: {parse_error}");
        return;
    }
    if result.valid {
        println!("valid (no blocking issues)");
    } else {
        println!("invalid: {} issue(s)", result.issues.len());
    }
    for issue in &result.issues {
        let where_ = issue
            .location
            .map(|loc| format!(" at {}:{}", loc.line, loc.start))
            .unwrap_or_default();
        println!("  [{:?}] {}: {}{}", issue.severity, issue.code, issue.message, where_);
    }
}

/// `agentscript run <file> [--security-level LEVEL]` (spec §6.1, §6.4).
///
/// Runs against the bundled `EchoToolHandler` (spec §8.1 invariant 4's
/// round-trip handler) — the CLI has no notion of a real embedder-supplied
/// tool backend; that wiring belongs to whatever out-of-scope HTTP
/// middleware (spec §1) fronts a real session.
#[allow(clippy::too_many_arguments)]
async fn run_cmd(
    file: &str,
    security_level: agentscript_core::SecurityLevel,
    json: bool,
    custom_globals: Vec<String>,
    timeout_ms: Option<u64>,
    max_iterations: Option<u64>,
    max_tool_calls: Option<u64>,
) -> Result<()> {
    let source = read_source(file)?;

    let settings = SandboxSettings {
        security_level,
        custom_globals: custom_globals.clone(),
        overrides: PolicyOverrides {
            timeout_ms,
            max_iterations,
            max_tool_calls,
            ..PolicyOverrides::default()
        },
    };
    let policy = settings.resolve();

    let sandbox = Sandbox::new(policy, EchoToolHandler).with_custom_globals(custom_globals);
    let result = sandbox.run(&source).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_execution_report(&result);
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_execution_report(result: &agentscript_sandbox::ExecutionResult) {
    if result.success {
        println!("success");
        if let Some(value) = &result.value {
            println!("value: {value}");
        }
    } else if let Some(error) = &result.error {
        println!("failed: [{}] {}: {}", error.code, error.name, error.message);
        if let Some(stack) = &error.stack {
            println!("stack:\n{stack}");
        }
    }
    println!(
        "stats: duration_ms={} tool_calls={} iterations={} console_calls={} console_bytes={}",
        result.stats.duration_ms,
        result.stats.tool_call_count,
        result.stats.iteration_count,
        result.stats.console_call_count,
        result.stats.console_bytes,
    );
}
