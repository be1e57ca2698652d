use clap::{Parser, Subcommand};

/// AgentScript Sandbox — validate and run untrusted AgentScript programs.
#[derive(Parser, Debug)]
#[command(name = "agentscript")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the static validator over a script and report issues (spec §6.1).
    Validate {
        /// Path to the AgentScript source file
        #[arg(value_name = "FILE")]
        file: String,

        /// Print the full `ValidationResult` as JSON instead of a text report
        #[arg(long)]
        json: bool,

        /// Extra identifiers treated as known globals
        #[arg(long = "custom-global", value_name = "NAME")]
        custom_globals: Vec<String>,
    },

    /// Validate, transform, and execute a script against the bundled
    /// tool-call bridge (spec §6.1 `run`).
    Run {
        /// Path to the AgentScript source file
        #[arg(value_name = "FILE")]
        file: String,

        /// Security preset to run under
        #[arg(long, value_enum, default_value = "secure")]
        security_level: SecurityLevelArg,

        /// Print the full `ExecutionResult` as JSON instead of a text report
        #[arg(long)]
        json: bool,

        /// Extra identifiers treated as known globals
        #[arg(long = "custom-global", value_name = "NAME")]
        custom_globals: Vec<String>,

        /// Override the execution timeout, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Override the iteration ceiling
        #[arg(long)]
        max_iterations: Option<u64>,

        /// Override the tool-call ceiling
        #[arg(long)]
        max_tool_calls: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SecurityLevelArg {
    Strict,
    Secure,
    Standard,
    Permissive,
}

impl From<SecurityLevelArg> for agentscript_core::SecurityLevel {
    fn from(value: SecurityLevelArg) -> Self {
        match value {
            SecurityLevelArg::Strict => agentscript_core::SecurityLevel::Strict,
            SecurityLevelArg::Secure => agentscript_core::SecurityLevel::Secure,
            SecurityLevelArg::Standard => agentscript_core::SecurityLevel::Standard,
            SecurityLevelArg::Permissive => agentscript_core::SecurityLevel::Permissive,
        }
    }
}
