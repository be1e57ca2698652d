//! Canonical sandbox security policy — single source of truth.
//!
//! Distinct from the validator's rule set (see `agentscript-validator`):
//! - this module defines the **runtime** ceilings and proxy configuration
//!   every `SecurityLevel` preset carries (spec §4.5, §6.2)
//! - the validator's rules are the **static** pre-execution checks (spec
//!   §4.1)
//!
//! This split mirrors the teacher's own module-level doc comment in
//! `skilllite-sandbox::security::policy`, which draws exactly this line
//! between "static code scanning" and "runtime isolation rules".

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One of the four complete configurations named by spec §3.1 and §6.2.
/// `Strict < Secure < Standard < Permissive` monotonically loosens limits;
/// all four retain AST validation and secure-proxy wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Strict,
    #[default]
    Secure,
    Standard,
    Permissive,
}

/// Depth-bounded proxy configuration (spec §3.1 "Proxy Config").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub block_constructor: bool,
    pub block_prototype: bool,
    pub block_legacy_accessors: bool,
    pub max_depth: u32,
}

/// The complete, field-overridable configuration behind one `SecurityLevel`
/// (spec §4.5 table, §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxPolicy {
    pub security_level: SecurityLevel,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    pub max_iterations: u64,
    pub max_tool_calls: u64,
    pub max_concurrent_child_tasks: u32,
    pub memory_ceiling_bytes: u64,
    pub max_console_calls: u64,
    pub max_console_output_bytes: u64,
    pub sanitize_stack_traces: bool,
    pub proxy_config: ProxyConfig,
    pub allow_functions_in_globals: bool,
    pub max_sanitize_depth: u32,
    pub max_sanitize_properties: u32,
    pub max_input_size_bytes: u64,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

impl SandboxPolicy {
    /// Build the complete policy for a named level (spec §4.5 table).
    ///
    /// Numeric ceilings below are an implementation's concrete choice for
    /// the spec's relative scale (short/moderate/long, low/moderate/high/
    /// very-high); they are part of this crate's wire contract the way
    /// `skilllite-sandbox::common::DEFAULT_MAX_MEMORY_MB` etc. are the
    /// teacher's pinned defaults.
    pub fn for_level(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::Strict => Self {
                security_level: level,
                timeout: Duration::from_millis(2_000),
                max_iterations: 1_000,
                max_tool_calls: 10,
                max_concurrent_child_tasks: 0,
                memory_ceiling_bytes: 10 * 1024 * 1024,
                max_console_calls: 100,
                max_console_output_bytes: 64 * 1024,
                sanitize_stack_traces: true,
                proxy_config: ProxyConfig {
                    block_constructor: true,
                    block_prototype: true,
                    block_legacy_accessors: true,
                    max_depth: 5,
                },
                allow_functions_in_globals: false,
                max_sanitize_depth: 20,
                max_sanitize_properties: 500,
                max_input_size_bytes: 64 * 1024,
            },
            SecurityLevel::Secure => Self {
                security_level: level,
                timeout: Duration::from_millis(10_000),
                max_iterations: 50_000,
                max_tool_calls: 50,
                max_concurrent_child_tasks: 4,
                memory_ceiling_bytes: 10 * 1024 * 1024,
                max_console_calls: 1_000,
                max_console_output_bytes: 256 * 1024,
                sanitize_stack_traces: true,
                proxy_config: ProxyConfig {
                    block_constructor: true,
                    block_prototype: true,
                    block_legacy_accessors: true,
                    max_depth: 8,
                },
                allow_functions_in_globals: false,
                max_sanitize_depth: 20,
                max_sanitize_properties: 1_000,
                max_input_size_bytes: 256 * 1024,
            },
            SecurityLevel::Standard => Self {
                security_level: level,
                timeout: Duration::from_millis(30_000),
                max_iterations: 500_000,
                max_tool_calls: 200,
                max_concurrent_child_tasks: 16,
                memory_ceiling_bytes: 128 * 1024 * 1024,
                max_console_calls: 10_000,
                max_console_output_bytes: 1024 * 1024,
                sanitize_stack_traces: false,
                proxy_config: ProxyConfig {
                    block_constructor: true,
                    block_prototype: true,
                    block_legacy_accessors: true,
                    max_depth: 10,
                },
                allow_functions_in_globals: false,
                max_sanitize_depth: 30,
                max_sanitize_properties: 5_000,
                max_input_size_bytes: 2 * 1024 * 1024,
            },
            SecurityLevel::Permissive => Self {
                security_level: level,
                timeout: Duration::from_millis(120_000),
                max_iterations: 5_000_000,
                max_tool_calls: 2_000,
                max_concurrent_child_tasks: 64,
                memory_ceiling_bytes: 512 * 1024 * 1024,
                max_console_calls: 100_000,
                max_console_output_bytes: 10 * 1024 * 1024,
                sanitize_stack_traces: false,
                proxy_config: ProxyConfig {
                    block_constructor: false,
                    block_prototype: true,
                    block_legacy_accessors: true,
                    max_depth: 16,
                },
                allow_functions_in_globals: true,
                max_sanitize_depth: 40,
                max_sanitize_properties: 20_000,
                max_input_size_bytes: 8 * 1024 * 1024,
            },
        }
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::for_level(SecurityLevel::default())
    }
}

/// Per-session field-by-field overrides (spec §6.2's `overrides` bag).
/// The caller's value wins wherever `Some`; everything else keeps the
/// preset's value, matching `RulesConfig`'s override-merge shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyOverrides {
    pub timeout_ms: Option<u64>,
    pub max_iterations: Option<u64>,
    pub max_tool_calls: Option<u64>,
    pub memory_ceiling_bytes: Option<u64>,
    pub max_sanitize_depth: Option<u32>,
    pub sanitize_stack_traces: Option<bool>,
    pub proxy_config: Option<ProxyConfig>,
    pub allow_functions_in_globals: Option<bool>,
    pub max_console_output_bytes: Option<u64>,
    pub max_console_calls: Option<u64>,
}

impl PolicyOverrides {
    /// Merge these overrides onto a base policy, caller's value winning.
    pub fn apply(&self, mut base: SandboxPolicy) -> SandboxPolicy {
        if let Some(ms) = self.timeout_ms {
            base.timeout = Duration::from_millis(ms);
        }
        if let Some(v) = self.max_iterations {
            base.max_iterations = v;
        }
        if let Some(v) = self.max_tool_calls {
            base.max_tool_calls = v;
        }
        if let Some(v) = self.memory_ceiling_bytes {
            base.memory_ceiling_bytes = v;
        }
        if let Some(v) = self.max_sanitize_depth {
            base.max_sanitize_depth = v;
        }
        if let Some(v) = self.sanitize_stack_traces {
            base.sanitize_stack_traces = v;
        }
        if let Some(v) = self.proxy_config {
            base.proxy_config = v;
        }
        if let Some(v) = self.allow_functions_in_globals {
            base.allow_functions_in_globals = v;
        }
        if let Some(v) = self.max_console_output_bytes {
            base.max_console_output_bytes = v;
        }
        if let Some(v) = self.max_console_calls {
            base.max_console_calls = v;
        }
        base
    }
}

/// The full embedder-facing configuration (spec §6.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxSettings {
    pub security_level: SecurityLevel,
    #[serde(default)]
    pub custom_globals: Vec<String>,
    #[serde(default)]
    pub overrides: PolicyOverrides,
}

impl SandboxSettings {
    pub fn resolve(&self) -> SandboxPolicy {
        self.overrides.apply(SandboxPolicy::for_level(self.security_level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_monotonically_loosen() {
        let strict = SandboxPolicy::for_level(SecurityLevel::Strict);
        let secure = SandboxPolicy::for_level(SecurityLevel::Secure);
        let standard = SandboxPolicy::for_level(SecurityLevel::Standard);
        let permissive = SandboxPolicy::for_level(SecurityLevel::Permissive);

        assert!(strict.max_iterations < secure.max_iterations);
        assert!(secure.max_iterations < standard.max_iterations);
        assert!(standard.max_iterations < permissive.max_iterations);

        assert!(strict.timeout < secure.timeout);
        assert!(secure.timeout < standard.timeout);
        assert!(standard.timeout < permissive.timeout);

        assert!(strict.proxy_config.max_depth < permissive.proxy_config.max_depth);
        assert!(!strict.allow_functions_in_globals);
        assert!(permissive.allow_functions_in_globals);
    }

    #[test]
    fn overrides_win_over_preset() {
        let overrides = PolicyOverrides {
            max_tool_calls: Some(7),
            ..Default::default()
        };
        let policy = overrides.apply(SandboxPolicy::for_level(SecurityLevel::Standard));
        assert_eq!(policy.max_tool_calls, 7);
        // Untouched fields keep the preset's value.
        assert_eq!(policy.security_level, SecurityLevel::Standard);
    }

    #[test]
    fn settings_resolve_applies_overrides() {
        let settings = SandboxSettings {
            security_level: SecurityLevel::Strict,
            custom_globals: vec!["myGlobal".into()],
            overrides: PolicyOverrides {
                max_iterations: Some(5),
                ..Default::default()
            },
        };
        let policy = settings.resolve();
        assert_eq!(policy.max_iterations, 5);
        assert_eq!(policy.security_level, SecurityLevel::Strict);
    }
}
