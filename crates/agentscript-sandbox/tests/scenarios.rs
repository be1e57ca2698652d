//! End-to-end reproductions of the concrete scenarios in spec §8.3, run
//! against the real pipeline (`agentscript_validator::validate` →
//! `agentscript_transform::transform` → `Sandbox::run`), not mocks of it.

use agentscript_core::{SandboxPolicy, SecurityLevel};
use agentscript_sandbox::{EchoToolHandler, NeverResolvingToolHandler, Sandbox};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts how many times it was invoked, for scenarios that assert an
/// exact call count (spec §8.3 Scenario C, D).
struct CountingToolHandler {
    calls: Arc<AtomicU64>,
}

#[async_trait]
impl agentscript_sandbox::ToolHandler for CountingToolHandler {
    async fn call(&self, _name: &str, _args: Value) -> Result<Value, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!(null))
    }
}

/// Scenario A — happy path (spec §8.3).
#[tokio::test]
async fn scenario_a_happy_path() {
    let policy = SandboxPolicy::for_level(SecurityLevel::Standard);
    let sandbox = Sandbox::new(policy, EchoToolHandler);
    let result = sandbox.run("const x = 1; return x + 1;").await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.value, Some(json!(2)));
    assert!(result.error.is_none());
}

/// Scenario B — obfuscated constructor access never reaches the escape
/// value, whether the validator rejects it outright or the runtime proxy
/// intercepts the computed access (spec §8.3 Scenario B, §9 "the runtime
/// proxy is the backstop for keys that are only knowable at runtime").
#[tokio::test]
async fn scenario_b_obfuscated_constructor_access_is_blocked() {
    let policy = SandboxPolicy::for_level(SecurityLevel::Standard);
    let sandbox = Sandbox::new(policy, EchoToolHandler);
    let source = r#"const k = "con" + "structor"; return Array[k] ? "escape" : "blocked";"#;
    let result = sandbox.run(source).await;

    assert!(!result.success);
    let code = result.error.as_ref().map(|e| e.code).unwrap_or("");
    assert!(
        code == "VALIDATION_ERROR" || code == "SECURITY_VIOLATION",
        "unexpected code: {code}"
    );
    assert_ne!(result.value, Some(json!("escape")));
}

/// Scenario C — tool-call ceiling stops the loop exactly at the ceiling
/// (spec §8.3 Scenario C).
#[tokio::test]
async fn scenario_c_tool_call_ceiling() {
    let mut policy = SandboxPolicy::for_level(SecurityLevel::Standard);
    policy.max_tool_calls = 10;
    policy.timeout = std::time::Duration::from_secs(5);

    let calls = Arc::new(AtomicU64::new(0));
    let handler = CountingToolHandler { calls: Arc::clone(&calls) };
    let sandbox = Sandbox::new(policy, handler);
    let source = r#"
        for (const x of Array(50)) {
            await callTool("noop", {});
        }
        return 1;
    "#;
    let result = sandbox.run(source).await;

    assert!(!result.success);
    assert_eq!(result.error.as_ref().map(|e| e.code), Some("TOOL_LIMIT_EXCEEDED"));
    assert_eq!(result.stats.tool_call_count, 10);
}

/// Scenario D — an absolute wall-clock deadline aborts a script awaiting a
/// never-resolving tool call, and the handler is invoked exactly once
/// (spec §8.3 Scenario D).
#[tokio::test]
async fn scenario_d_timeout_aborts_pending_tool_call() {
    let mut policy = SandboxPolicy::for_level(SecurityLevel::Standard);
    policy.timeout = std::time::Duration::from_millis(1000);

    let sandbox = Sandbox::new(policy, NeverResolvingToolHandler);
    let source = r#"await callTool("wait_forever", {}); return 1;"#;
    let start = std::time::Instant::now();
    let result = sandbox.run(source).await;
    let elapsed = start.elapsed();

    assert!(!result.success);
    assert_eq!(result.error.as_ref().map(|e| e.code), Some("SANDBOX_ABORTED"));
    assert!(elapsed.as_millis() >= 1000, "elapsed={elapsed:?}");
}

/// Scenario E — an uncaught `TypeError` surfaces sanitized: the code is
/// `EXECUTION_ERROR`, the name is preserved, and a stack trace (if any)
/// carries no raw filesystem paths (spec §8.3 Scenario E).
#[tokio::test]
async fn scenario_e_sanitized_error() {
    let policy = SandboxPolicy::for_level(SecurityLevel::Strict);
    let sandbox = Sandbox::new(policy, EchoToolHandler);
    let result = sandbox.run("return null.foo;").await;

    assert!(!result.success);
    let error = result.error.expect("expected an error");
    assert_eq!(error.code, "EXECUTION_ERROR");
    assert_eq!(error.name, "TypeError");
    if let Some(stack) = &error.stack {
        assert!(!stack.contains("/Users/"));
        assert!(!stack.contains("/home/"));
        assert!(!stack.contains("node_modules"));
    }
}

/// Scenario F — a circular object passed to `callTool` arrives at the
/// handler with the cycle replaced by the literal string `"[Circular]"`
/// (spec §8.3 Scenario F).
#[tokio::test]
async fn scenario_f_circular_argument_is_neutralized() {
    struct CapturingToolHandler {
        captured: Arc<std::sync::Mutex<Option<Value>>>,
    }

    #[async_trait]
    impl agentscript_sandbox::ToolHandler for CapturingToolHandler {
        async fn call(&self, _name: &str, args: Value) -> Result<Value, String> {
            *self.captured.lock().unwrap() = Some(args.clone());
            Ok(args)
        }
    }

    let captured = Arc::new(std::sync::Mutex::new(None));
    let handler = CapturingToolHandler { captured: Arc::clone(&captured) };
    let policy = SandboxPolicy::for_level(SecurityLevel::Standard);
    let sandbox = Sandbox::new(policy, handler);
    let source = r#"
        const o = {};
        o.self = o;
        return await callTool("save", o);
    "#;
    let result = sandbox.run(source).await;

    assert!(result.success, "{:?}", result.error);
    let seen = captured.lock().unwrap().clone().expect("handler was called");
    assert_eq!(seen["self"], json!("[Circular]"));
}

/// Scenario G — walking `err.__proto__` after a caught tool error never
/// recovers a value placed in the outer globals; the access is blocked or
/// the program's own guard returns a safe sentinel (spec §8.3 Scenario G).
#[tokio::test]
async fn scenario_g_prototype_escape_through_caught_error_is_neutralized() {
    struct FailingToolHandler;

    #[async_trait]
    impl agentscript_sandbox::ToolHandler for FailingToolHandler {
        async fn call(&self, _name: &str, _args: Value) -> Result<Value, String> {
            Err("tool not found".to_string())
        }
    }

    let policy = SandboxPolicy::for_level(SecurityLevel::Standard);
    let sandbox = Sandbox::new(policy, FailingToolHandler);
    let source = r#"
        try {
            await callTool("missing_tool", {});
            return "unreachable";
        } catch (err) {
            if (err.__proto__) {
                return "escape";
            }
            return "blocked";
        }
    "#;
    let result = sandbox.run(source).await;

    // Either the validator's `DISALLOWED_IDENTIFIER`/`SECURITY_VIOLATION`
    // rules reject the `.__proto__` access outright, or the program runs
    // and observes the proxy's `getPrototypeOf` trap returning `null`.
    if result.success {
        assert_eq!(result.value, Some(json!("blocked")));
    } else {
        let code = result.error.as_ref().map(|e| e.code).unwrap_or("");
        assert!(
            code == "VALIDATION_ERROR" || code == "SECURITY_VIOLATION",
            "unexpected code: {code}"
        );
    }
}

/// Spec §8.1 invariant 2 — a rejected source never invokes the tool
/// handler at all.
#[tokio::test]
async fn reject_then_execute_never_holds() {
    struct PanicIfCalledHandler;

    #[async_trait]
    impl agentscript_sandbox::ToolHandler for PanicIfCalledHandler {
        async fn call(&self, _name: &str, _args: Value) -> Result<Value, String> {
            panic!("tool handler must not be invoked for a rejected source");
        }
    }

    let policy = SandboxPolicy::for_level(SecurityLevel::Standard);
    let sandbox = Sandbox::new(policy, PanicIfCalledHandler);
    let result = sandbox.run("eval('1 + 1'); return 1;").await;

    assert!(!result.success);
    assert_eq!(result.error.as_ref().map(|e| e.code), Some("VALIDATION_ERROR"));
}

/// Spec §8.1 invariant 4 — arg-wrapping round trip through the echo
/// handler.
#[tokio::test]
async fn arg_wrapping_roundtrip_for_plain_json() {
    let policy = SandboxPolicy::for_level(SecurityLevel::Standard);
    let sandbox = Sandbox::new(policy, EchoToolHandler);
    let source = r#"return await callTool("echo", { a: 1, b: [1, 2, 3], c: "text", d: null });"#;
    let result = sandbox.run(source).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.value,
        Some(json!({ "a": 1, "b": [1, 2, 3], "c": "text", "d": null }))
    );
}

/// Spec §8.2 — a single expression statement without an explicit return
/// produces `undefined` as the execution value.
#[tokio::test]
async fn expression_statement_without_return_yields_undefined_value() {
    let policy = SandboxPolicy::for_level(SecurityLevel::Standard);
    let sandbox = Sandbox::new(policy, EchoToolHandler);
    let result = sandbox.run("1 + 1;").await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.value, Some(json!(null)));
}

/// Spec §4.2 last bullet / §9 Open Question — a string literal over the
/// extraction threshold is addressable through `__ref(id)` and resolves
/// back to the original value.
#[tokio::test]
async fn large_string_literal_resolves_through_ref_handle() {
    let policy = SandboxPolicy::for_level(SecurityLevel::Standard);
    let sandbox = Sandbox::new(policy, EchoToolHandler);
    let huge = "a".repeat(5000);
    let source = format!(r#"const s = "{huge}"; return s.length;"#);
    let result = sandbox.run(&source).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.value, Some(json!(5000)));
}

/// Spec §8.2 — a loop body run exactly at the iteration ceiling completes
/// without error; one iteration beyond raises.
#[tokio::test]
async fn iteration_ceiling_boundary() {
    let mut policy = SandboxPolicy::for_level(SecurityLevel::Standard);
    policy.max_iterations = 5;
    let sandbox = Sandbox::new(policy, EchoToolHandler);

    let at_ceiling = sandbox
        .run("let n = 0; for (let i = 0; i < 5; i++) { n++; } return n;")
        .await;
    assert!(at_ceiling.success, "{:?}", at_ceiling.error);
    assert_eq!(at_ceiling.value, Some(json!(5)));

    let over_ceiling = sandbox
        .run("let n = 0; for (let i = 0; i < 6; i++) { n++; } return n;")
        .await;
    assert!(!over_ceiling.success);
    assert_eq!(
        over_ceiling.error.as_ref().map(|e| e.code),
        Some("ITERATION_LIMIT_EXCEEDED")
    );
}
