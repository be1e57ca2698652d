//! Stage three of the pipeline: run validated, transformed source inside
//! the nested isolate and produce an `ExecutionResult` (spec §4.3).
//!
//! One `Sandbox` is cheap to keep around (it owns only the policy and the
//! embedder's `ToolHandler`); `run` builds a fresh `rquickjs::AsyncRuntime`
//! and `AsyncContext` per call, matching spec §3.1's "Execution context":
//! "one per `execute()` call, discarded afterward."

use std::collections::HashMap;
use std::sync::Arc;

use agentscript_core::{SandboxPolicy, ValidationResult};
use agentscript_transform::TransformOptions;
use agentscript_validator::ValidateOptions;
use rquickjs::function::{Async, Func};
use rquickjs::{async_with, AsyncContext, AsyncRuntime, Ctx, Value};
use serde_json::json;
use tracing::Instrument;

use crate::bootstrap;
use crate::context::ExecutionContext;
use crate::result::{ExecutionResult, ExecutionStats, SafeErrorInfo};
use crate::safe_error;
use crate::sanitize;
use crate::tool::{ToolHandler, ToolNamePolicy};

/// Runs one AgentScript program end to end against a fixed policy and
/// tool handler (spec §3.1 "Tool handler (capability)").
pub struct Sandbox<H: ToolHandler + 'static> {
    policy: SandboxPolicy,
    tool_handler: Arc<H>,
    tool_name_policy: Arc<ToolNamePolicy>,
    custom_globals: Vec<String>,
}

impl<H: ToolHandler + 'static> Sandbox<H> {
    pub fn new(policy: SandboxPolicy, tool_handler: H) -> Self {
        Self {
            policy,
            tool_handler: Arc::new(tool_handler),
            tool_name_policy: Arc::new(ToolNamePolicy::default()),
            custom_globals: Vec::new(),
        }
    }

    pub fn with_tool_name_policy(mut self, policy: ToolNamePolicy) -> Self {
        self.tool_name_policy = Arc::new(policy);
        self
    }

    pub fn with_custom_globals(mut self, globals: Vec<String>) -> Self {
        self.custom_globals = globals;
        self
    }

    /// Validate, transform, and execute `source` (spec §6.1 `run(source,
    /// settings)`). Never panics: every failure mode, including a rejected
    /// validation pass, comes back as a `success: false` `ExecutionResult`.
    pub async fn run(&self, source: &str) -> ExecutionResult {
        let session_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "agentscript_run",
            security_level = ?self.policy.security_level,
            session_id = %session_id,
        );
        async move {
            if source.len() as u64 > self.policy.max_input_size_bytes {
                tracing::debug!(len = source.len(), "agentscript source exceeds max_input_size_bytes");
                return ExecutionResult::failed(
                    SafeErrorInfo {
                        name: "ValidationError".into(),
                        message: "source exceeds the configured maximum input size".into(),
                        code: "VALIDATION_ERROR",
                        stack: None,
                    },
                    ExecutionStats::default(),
                );
            }

            let validation = self.validate(source);
            if !validation.valid {
                tracing::info!(issue_count = validation.issues.len(), "agentscript source rejected by validator");
                let message = validation
                    .parse_error
                    .clone()
                    .unwrap_or_else(|| format!("{} validation issue(s)", validation.issues.len()));
                return ExecutionResult::failed(
                    SafeErrorInfo {
                        name: "ValidationError".into(),
                        message,
                        code: "VALIDATION_ERROR",
                        stack: None,
                    },
                    ExecutionStats::default(),
                );
            }

            // `transform_concatenation` stays off here (spec §4.2 lists it as
            // optional hardening, not a mandatory rewrite): the pass has no
            // type information, so rewriting every `+` indiscriminately would
            // coerce numeric addition through `__safe_concat`'s string
            // coercion and break `x + 1`-shaped arithmetic (spec §8.3
            // Scenario A's happy path). `transform_templates` is always safe
            // to force — a template literal is a string by construction, so
            // routing it through `__safe_template` only adds the allocation
            // charge, never changes its value.
            let transform_options = TransformOptions {
                transform_templates: true,
                extract_large_strings: true,
                ..TransformOptions::default()
            };
            let transformed = match agentscript_transform::transform(source, &transform_options) {
                Ok(output) => output,
                Err(err) => {
                    tracing::warn!(%err, "agentscript transform stage failed on validator-accepted source");
                    return ExecutionResult::failed(
                        SafeErrorInfo {
                            name: "TransformError".into(),
                            message: err.to_string(),
                            code: "EXECUTION_ERROR",
                            stack: None,
                        },
                        ExecutionStats::default(),
                    );
                }
            };

            let large_strings: Arc<HashMap<u32, String>> = Arc::new(
                transformed
                    .large_strings
                    .into_iter()
                    .map(|handle| (handle.id, handle.value))
                    .collect(),
            );
            self.execute(&transformed.source, large_strings).await
        }
        .instrument(span)
        .await
    }

    fn validate(&self, source: &str) -> ValidationResult {
        let options = ValidateOptions {
            custom_globals: self.custom_globals.clone(),
            allow_function_declarations: false,
            allow_regex: false,
            resource_exhaustion_ceiling: 10_000,
            permissive_resource_exhaustion: self.policy.allow_functions_in_globals,
        };
        agentscript_validator::validate(source, &options)
    }

    async fn execute(
        &self,
        transformed_source: &str,
        large_strings: Arc<HashMap<u32, String>>,
    ) -> ExecutionResult {
        let exec_ctx = Arc::new(ExecutionContext::new(self.policy.clone()));
        let timeout = self.policy.timeout;

        let outcome = tokio::time::timeout(
            timeout,
            self.run_in_isolate(Arc::clone(&exec_ctx), transformed_source.to_string(), large_strings),
        )
        .await;

        let stats = stats_from(&exec_ctx);
        match outcome {
            Ok(Ok(value)) => ExecutionResult::ok(value, stats),
            Ok(Err(info)) => ExecutionResult::failed(info, stats),
            Err(_elapsed) => {
                exec_ctx.abort("wall-clock timeout exceeded");
                tracing::info!(timeout_ms = timeout.as_millis() as u64, "agentscript execution timed out");
                ExecutionResult::failed(
                    SafeErrorInfo {
                        name: "TimeoutError".into(),
                        message: "execution exceeded the configured timeout".into(),
                        code: "SANDBOX_ABORTED",
                        stack: None,
                    },
                    stats,
                )
            }
        }
    }

    async fn run_in_isolate(
        &self,
        exec_ctx: Arc<ExecutionContext>,
        source: String,
        large_strings: Arc<HashMap<u32, String>>,
    ) -> Result<serde_json::Value, SafeErrorInfo> {
        let runtime = AsyncRuntime::new().map_err(enclave_error)?;
        let js_ctx = AsyncContext::full(&runtime).await.map_err(enclave_error)?;

        let policy = self.policy.clone();
        let tool_handler = Arc::clone(&self.tool_handler);
        let tool_name_policy = Arc::clone(&self.tool_name_policy);
        let bridge_ctx = Arc::clone(&exec_ctx);

        // Every fallible step below reports its failure the same way: catch
        // whatever exception QuickJS left pending on `ctx` and turn it into
        // a `SafeErrorInfo` (spec §3.2 invariant 5). Written as an explicit
        // match chain rather than `?` so each step can name which stage
        // failed without needing a bespoke `From<rquickjs::Error>` impl.
        let result: Result<String, SafeErrorInfo> = async_with!(js_ctx => |ctx| {
            if let Err(e) = register_native_bridge(&ctx, bridge_ctx, tool_handler, tool_name_policy, large_strings, &policy) {
                return Err(from_ctx_error(&ctx, e, policy.sanitize_stack_traces));
            }
            if let Err(e) = eval_bootstrap(&ctx, &policy) {
                return Err(from_ctx_error(&ctx, e, policy.sanitize_stack_traces));
            }
            if let Err(e) = ctx.eval::<(), _>(source.as_str()) {
                return Err(from_ctx_error(&ctx, e, policy.sanitize_stack_traces));
            }
            let entry: rquickjs::Function = match ctx.globals().get(agentscript_transform::ENTRY_FUNCTION_NAME) {
                Ok(f) => f,
                Err(e) => return Err(from_ctx_error(&ctx, e, policy.sanitize_stack_traces)),
            };
            let promise: rquickjs::Promise = match entry.call(()) {
                Ok(p) => p,
                Err(e) => return Err(from_ctx_error(&ctx, e, policy.sanitize_stack_traces)),
            };
            let value: Value = match promise.into_future::<Value>().await {
                Ok(v) => v,
                Err(e) => return Err(from_ctx_error(&ctx, e, policy.sanitize_stack_traces)),
            };
            match stringify_result(&ctx, &value, &policy) {
                Ok(s) => Ok(s),
                Err(e) => Err(from_ctx_error(&ctx, e, policy.sanitize_stack_traces)),
            }
        })
        .await;

        let json_text = result?;
        let value: serde_json::Value = serde_json::from_str(&json_text).unwrap_or(json!(null));
        Ok(sanitize::sanitize(&value, self.policy.max_sanitize_depth, self.policy.max_sanitize_properties))
    }
}

/// Registers the native Rust functions the bootstrap/safe-helper JS calls
/// into: the tool-call bridge and the resource-ceiling checks (spec §4.3.3,
/// §5).
fn register_native_bridge<H: ToolHandler + 'static>(
    ctx: &Ctx<'_>,
    exec_ctx: Arc<ExecutionContext>,
    tool_handler: Arc<H>,
    tool_name_policy: Arc<ToolNamePolicy>,
    large_strings: Arc<HashMap<u32, String>>,
    policy: &SandboxPolicy,
) -> rquickjs::Result<()> {
    let sanitize_depth = policy.max_sanitize_depth;
    let sanitize_props = policy.max_sanitize_properties;

    let check_ctx = Arc::clone(&exec_ctx);
    ctx.globals().set(
        "__ag_check_aborted",
        Func::from(move || check_ctx.is_aborted()),
    )?;

    let iter_ctx = Arc::clone(&exec_ctx);
    ctx.globals().set(
        "__ag_check_iteration",
        Func::from(move || iter_ctx.tick_iteration()),
    )?;

    let charge_ctx = Arc::clone(&exec_ctx);
    ctx.globals().set(
        "__ag_charge_bytes",
        Func::from(move |bytes: f64| charge_ctx.charge_bytes(bytes.max(0.0) as u64)),
    )?;

    let console_ctx = Arc::clone(&exec_ctx);
    ctx.globals().set(
        "__ag_console_sink",
        Func::from(move |level: String, payload: String| -> bool {
            let ok = console_ctx.tick_console(payload.len() as u64);
            if ok {
                tracing::info!(target: "agentscript::console", level = %level, message = %payload);
            }
            ok
        }),
    )?;

    // `__ref(id)` resolution (spec §4.2 last bullet): the handle table is
    // built once in `run()` from the transform stage's output and charged
    // against the memory ceiling on every resolution, same as
    // `__safe_concat`/`__safe_template` charge their output length.
    let resolve_ctx = Arc::clone(&exec_ctx);
    ctx.globals().set(
        "__ag_resolve_ref",
        Func::from(move |id: f64| -> Option<String> {
            let handle = large_strings.get(&(id as u32))?;
            if resolve_ctx.charge_bytes(handle.len() as u64) {
                Some(handle.clone())
            } else {
                None
            }
        }),
    )?;

    let bridge_exec_ctx = Arc::clone(&exec_ctx);
    ctx.globals().set(
        "__ag_host_call_tool",
        Func::from(Async(move |name: String, args_json: String| {
            let exec_ctx = Arc::clone(&bridge_exec_ctx);
            let handler = Arc::clone(&tool_handler);
            let name_policy = Arc::clone(&tool_name_policy);
            async move {
                tool_call_bridge(
                    exec_ctx,
                    handler,
                    name_policy,
                    sanitize_depth,
                    sanitize_props,
                    name,
                    args_json,
                )
                .await
            }
        })),
    )?;

    Ok(())
}

/// The async tool-call bridge itself (spec §4.3.3 `__safe_callTool`'s host
/// side, §5): checks abort/ceilings first, then the operation-name policy,
/// then sanitizes both the outbound args and the inbound result, always
/// returning a JSON envelope — the guest side never sees a raw Rust error.
async fn tool_call_bridge<H: ToolHandler>(
    exec_ctx: Arc<ExecutionContext>,
    handler: Arc<H>,
    name_policy: Arc<ToolNamePolicy>,
    sanitize_depth: u32,
    sanitize_props: u32,
    name: String,
    args_json: String,
) -> String {
    if exec_ctx.is_aborted() {
        return error_envelope("SandboxAbortedError", "sandbox was aborted", "SANDBOX_ABORTED");
    }
    if !exec_ctx.tick_tool_call() {
        exec_ctx.abort("tool call limit exceeded");
        return error_envelope("ToolLimitError", "tool call limit exceeded", "TOOL_LIMIT_EXCEEDED");
    }
    if !name_policy.is_allowed(&name) {
        return error_envelope(
            "SecurityViolationError",
            &format!("tool `{name}` is not permitted by the current policy"),
            "SECURITY_VIOLATION",
        );
    }

    let call_index = exec_ctx.record_op(&name);
    let args: serde_json::Value = match serde_json::from_str(&args_json) {
        Ok(v) => v,
        Err(e) => {
            return error_envelope("ValidationError", &format!("invalid tool arguments: {e}"), "VALIDATION_ERROR");
        }
    };
    let sanitized_args = sanitize::sanitize(&args, sanitize_depth, sanitize_props);

    tracing::debug!(tool = %name, call_index, "agentscript tool call dispatched");
    match handler.call(&name, sanitized_args).await {
        Ok(value) => {
            let sanitized = sanitize::sanitize(&value, sanitize_depth, sanitize_props);
            json!({"ok": true, "value": sanitized}).to_string()
        }
        Err(message) => error_envelope("ToolError", &message, "EXECUTION_ERROR"),
    }
}

fn error_envelope(error_name: &str, message: &str, code: &str) -> String {
    json!({"ok": false, "errorName": error_name, "message": message, "code": code}).to_string()
}

/// Evaluate the host-authored bootstrap JS into `ctx`, in the order spec
/// §4.3.1/§4.4 requires: proxy factory and stringifier first (the safe
/// helpers and tool bridge depend on both), then the helpers themselves,
/// then wrap the curated globals, then strip hazard intrinsics last (so
/// everything above has already used what it needs).
fn eval_bootstrap(ctx: &Ctx<'_>, policy: &SandboxPolicy) -> rquickjs::Result<()> {
    ctx.eval::<(), _>(bootstrap::secure_proxy_js(&policy.proxy_config))?;
    ctx.eval::<(), _>(bootstrap::safe_stringify_js())?;
    ctx.eval::<(), _>(bootstrap::sanitize_limits_js(policy.max_sanitize_depth, policy.max_sanitize_properties))?;
    ctx.eval::<(), _>(bootstrap::safe_helpers_js())?;
    ctx.eval::<(), _>(bootstrap::WRAP_CURATED_GLOBALS_JS)?;
    ctx.eval::<(), _>(bootstrap::STRIP_HAZARD_GLOBALS_JS)?;
    Ok(())
}

/// Stringify `__ag_main()`'s resolved value through the same host-authored
/// sanitizer every other boundary crossing uses (spec §4.3.5, §6.4).
fn stringify_result<'js>(
    ctx: &Ctx<'js>,
    value: &Value<'js>,
    policy: &SandboxPolicy,
) -> rquickjs::Result<String> {
    let stringify: rquickjs::Function = ctx.globals().get("__ag_safe_stringify")?;
    stringify.call((value.clone(), policy.max_sanitize_depth, policy.max_sanitize_properties))
}

fn from_ctx_error(ctx: &Ctx<'_>, _err: rquickjs::Error, sanitize_stack_traces: bool) -> SafeErrorInfo {
    safe_error::capture_pending(ctx, sanitize_stack_traces)
}

fn enclave_error(err: rquickjs::Error) -> SafeErrorInfo {
    SafeErrorInfo {
        name: "EnclaveError".into(),
        message: err.to_string(),
        code: "ENCLAVE_ERROR",
        stack: None,
    }
}

fn stats_from(exec_ctx: &ExecutionContext) -> ExecutionStats {
    use std::sync::atomic::Ordering;
    ExecutionStats {
        duration_ms: exec_ctx.elapsed_ms(),
        tool_call_count: exec_ctx.counters.tool_calls.load(Ordering::SeqCst),
        iteration_count: exec_ctx.counters.iterations.load(Ordering::SeqCst),
        console_call_count: exec_ctx.counters.console_calls.load(Ordering::SeqCst),
        console_bytes: exec_ctx.counters.console_bytes.load(Ordering::SeqCst),
    }
}
