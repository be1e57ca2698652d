//! On-disk and environment configuration for the sandbox (spec §6.2 ambient
//! expansion).
//!
//! The search-path-then-fallback loader mirrors
//! `skilllite-core::config::RulesConfig::load_or_default`: look for a
//! project-local file first, fall back to a user config directory, and fall
//! back again to `SandboxSettings::default()` if neither parses. Environment
//! overrides follow `skilllite-core::config::loader`'s `env_or`/`env_bool`
//! alias-chain pattern, letting an operator override one field without a
//! file at all.

use crate::policy::{PolicyOverrides, SandboxSettings, SecurityLevel};
use std::path::{Path, PathBuf};

/// File name this crate looks for, project-local and in the user config dir.
const CONFIG_FILE_NAME: &str = ".agentscript.yaml";

/// Load `SandboxSettings` by checking, in order: an explicit path, the
/// current directory's `.agentscript.yaml`, `dirs::config_dir()/agentscript/
/// config.yaml`, and finally `SandboxSettings::default()`. Environment
/// variables (see [`apply_env_overrides`]) are applied last, on top of
/// whichever file (or default) was found.
pub fn load_or_default(explicit_path: Option<&Path>) -> SandboxSettings {
    let mut settings = explicit_path
        .map(|p| read_settings(p).unwrap_or_default())
        .or_else(|| {
            let cwd_candidate = PathBuf::from(CONFIG_FILE_NAME);
            cwd_candidate.exists().then(|| read_settings(&cwd_candidate)).flatten()
        })
        .or_else(|| {
            dirs::config_dir().and_then(|dir| {
                let candidate = dir.join("agentscript").join("config.yaml");
                candidate.exists().then(|| read_settings(&candidate)).flatten()
            })
        })
        .unwrap_or_default();

    apply_env_overrides(&mut settings);
    settings
}

fn read_settings(path: &Path) -> Option<SandboxSettings> {
    let contents = std::fs::read_to_string(path)
        .inspect_err(|err| tracing::warn!(?path, %err, "failed to read sandbox config file"))
        .ok()?;
    serde_yaml::from_str(&contents)
        .inspect_err(|err| tracing::warn!(?path, %err, "failed to parse sandbox config file"))
        .ok()
}

/// Read an `AGENTSCRIPT_*` variable, trying each name in `names` in order
/// and returning the first one that is set (spec §6.2 ambient expansion;
/// mirrors `skilllite-core::config::loader::env_or`'s alias-chain lookup,
/// used there so a renamed variable still honors its old name).
fn env_or(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| std::env::var(name).ok())
}

fn env_u64(names: &[&str]) -> Option<u64> {
    env_or(names).and_then(|v| v.parse().ok())
}

fn env_bool(names: &[&str]) -> Option<bool> {
    env_or(names).and_then(|v| match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

/// Apply `AGENTSCRIPT_*` environment overrides on top of an already-loaded
/// `SandboxSettings`, mutating it in place.
pub fn apply_env_overrides(settings: &mut SandboxSettings) {
    if let Some(level) = env_or(&["AGENTSCRIPT_SECURITY_LEVEL"]) {
        if let Some(parsed) = parse_security_level(&level) {
            settings.security_level = parsed;
        } else {
            tracing::warn!(value = %level, "unrecognized AGENTSCRIPT_SECURITY_LEVEL, ignoring");
        }
    }

    let overrides = &mut settings.overrides;
    if let Some(v) = env_u64(&["AGENTSCRIPT_TIMEOUT_MS"]) {
        overrides.timeout_ms = Some(v);
    }
    if let Some(v) = env_u64(&["AGENTSCRIPT_MAX_ITERATIONS"]) {
        overrides.max_iterations = Some(v);
    }
    if let Some(v) = env_u64(&["AGENTSCRIPT_MAX_TOOL_CALLS", "AGENTSCRIPT_MAX_TOOLCALLS"]) {
        overrides.max_tool_calls = Some(v);
    }
    if let Some(v) = env_u64(&["AGENTSCRIPT_MEMORY_CEILING_BYTES"]) {
        overrides.memory_ceiling_bytes = Some(v);
    }
    if let Some(v) = env_bool(&["AGENTSCRIPT_SANITIZE_STACK_TRACES"]) {
        overrides.sanitize_stack_traces = Some(v);
    }
    if let Some(v) = env_bool(&["AGENTSCRIPT_ALLOW_FUNCTIONS_IN_GLOBALS"]) {
        overrides.allow_functions_in_globals = Some(v);
    }
    if let Some(v) = env_u64(&["AGENTSCRIPT_MAX_CONSOLE_CALLS"]) {
        overrides.max_console_calls = Some(v);
    }
    if let Some(v) = env_u64(&["AGENTSCRIPT_MAX_CONSOLE_OUTPUT_BYTES"]) {
        overrides.max_console_output_bytes = Some(v);
    }
}

fn parse_security_level(raw: &str) -> Option<SecurityLevel> {
    match raw.to_ascii_lowercase().as_str() {
        "strict" => Some(SecurityLevel::Strict),
        "secure" => Some(SecurityLevel::Secure),
        "standard" => Some(SecurityLevel::Standard),
        "permissive" => Some(SecurityLevel::Permissive),
        _ => None,
    }
}

/// RAII guard that sets an environment variable for the lifetime of a test
/// and restores its previous value on drop, matching
/// `skilllite-core::config::loader::ScopedEnvGuard`. Process-wide env
/// mutation means tests using this must not run the affected var
/// concurrently; `agentscript-core`'s own tests that use it are serialized
/// by taking a shared lock.
pub struct ScopedEnvGuard {
    key: &'static str,
    previous: Option<String>,
}

impl ScopedEnvGuard {
    pub fn set(key: &'static str, value: &str) -> Self {
        let previous = std::env::var(key).ok();
        // SAFETY: test-only helper; callers serialize via `env_test_lock`.
        unsafe { std::env::set_var(key, value) };
        Self { key, previous }
    }
}

impl Drop for ScopedEnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(v) => unsafe { std::env::set_var(self.key, v) },
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_file_falls_back_to_default() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        let settings = load_or_default(Some(Path::new("/nonexistent/agentscript.yaml")));
        assert_eq!(settings.security_level, SecurityLevel::Secure);
    }

    #[test]
    fn explicit_file_is_parsed() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "security_level: strict\ncustom_globals: []\n").unwrap();
        let settings = load_or_default(Some(&path));
        assert_eq!(settings.security_level, SecurityLevel::Strict);
    }

    #[test]
    fn env_override_wins_over_file() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        let _guard = ScopedEnvGuard::set("AGENTSCRIPT_SECURITY_LEVEL", "permissive");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "security_level: strict\n").unwrap();
        let settings = load_or_default(Some(&path));
        assert_eq!(settings.security_level, SecurityLevel::Permissive);
    }

    #[test]
    fn env_override_applies_numeric_overrides() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        let _guard = ScopedEnvGuard::set("AGENTSCRIPT_MAX_TOOL_CALLS", "7");
        let mut settings = SandboxSettings::default();
        apply_env_overrides(&mut settings);
        assert_eq!(settings.overrides.max_tool_calls, Some(7));
    }

    #[test]
    fn overrides_merge_into_resolved_policy() {
        let mut settings = SandboxSettings {
            security_level: SecurityLevel::Standard,
            custom_globals: vec![],
            overrides: PolicyOverrides::default(),
        };
        settings.overrides.max_iterations = Some(42);
        let policy = settings.resolve();
        assert_eq!(policy.max_iterations, 42);
    }
}
