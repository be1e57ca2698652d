//! The host/guest tool-call bridge (spec §3.1 "Tool handler (capability)",
//! §6.3).
//!
//! Grounded on the stencila `codemode::sandbox::globals` reference's
//! `inject_call_tool_bridge`/`call_tool_bridge` shape: an async Rust
//! function registered as a native QuickJS function, called with plain
//! strings/JSON and returning a JSON envelope, with limit checks and
//! operation-name validation performed before the embedder's handler ever
//! runs.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

/// The embedder-supplied capability (spec §3.1, §6.3): `async fn(name,
/// args) -> json`. Implementors must not leak host-realm objects into the
/// sandbox unwrapped — returning a `serde_json::Value` already enforces
/// that at the type level, since a `Value` cannot carry a live JS or Rust
/// object reference.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, name: &str, args: Value) -> Result<Value, String>;
}

/// A handler that echoes its arguments back, used by the arg-wrapping
/// round-trip property test (spec §8.1 invariant 4) and as a default for
/// sessions that configure no real tools.
pub struct EchoToolHandler;

#[async_trait]
impl ToolHandler for EchoToolHandler {
    async fn call(&self, _name: &str, args: Value) -> Result<Value, String> {
        Ok(args)
    }
}

/// A handler that never resolves, for the timeout scenario (spec §8.3
/// Scenario D). Exists only in test code, but kept here (not under
/// `#[cfg(test)]`) so downstream integration tests in `tests/` can use it
/// too.
pub struct NeverResolvingToolHandler;

#[async_trait]
impl ToolHandler for NeverResolvingToolHandler {
    async fn call(&self, _name: &str, _args: Value) -> Result<Value, String> {
        std::future::pending::<()>().await;
        unreachable!("pending future never resolves")
    }
}

/// Operation-name validation (spec glossary "Operation name": "must match
/// the optional allow-pattern and not match the block-pattern").
#[derive(Default)]
pub struct ToolNamePolicy {
    pub allow: Option<Regex>,
    pub block: Option<Regex>,
}

impl ToolNamePolicy {
    pub fn is_allowed(&self, name: &str) -> bool {
        if let Some(block) = &self.block {
            if block.is_match(name) {
                return false;
            }
        }
        match &self.allow {
            Some(allow) => allow.is_match(name),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_handler_returns_args_unchanged() {
        let handler = EchoToolHandler;
        let args = serde_json::json!({"a": 1, "b": [1, 2, 3]});
        let result = handler.call("echo", args.clone()).await.unwrap();
        assert_eq!(result, args);
    }

    #[test]
    fn name_policy_blocks_before_checking_allow() {
        let policy = ToolNamePolicy {
            allow: Some(Regex::new(".*").unwrap()),
            block: Some(Regex::new("^danger_").unwrap()),
        };
        assert!(!policy.is_allowed("danger_delete"));
        assert!(policy.is_allowed("search"));
    }

    #[test]
    fn name_policy_defaults_to_allow_all() {
        let policy = ToolNamePolicy::default();
        assert!(policy.is_allowed("anything"));
    }
}
