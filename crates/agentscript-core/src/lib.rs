//! Shared data model for the AgentScript sandbox: validation issues and
//! results, security policy presets, the closed error taxonomy, stack-trace
//! redaction, and settings loading.
//!
//! Consumed by `agentscript-validator`, `agentscript-transform`, and
//! `agentscript-sandbox`, mirroring the way `skilllite-core` sits underneath
//! the teacher's other crates.

pub mod config;
pub mod deny_list;
pub mod error;
pub mod issue;
pub mod policy;
pub mod redaction;

pub use error::{ErrorResponse, SandboxError};
pub use issue::{Issue, IssueCode, Location, Severity, ValidationResult};
pub use policy::{PolicyOverrides, ProxyConfig, SandboxPolicy, SandboxSettings, SecurityLevel};
