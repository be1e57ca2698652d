//! Turning a thrown JS exception into the sanitized `SafeErrorInfo` spec
//! §3.2 invariant 5 requires: "a thrown error crossing out of the sandbox
//! carries only a plain `{name, message, stack?}` object with no
//! prototype chain back to the guest realm."
//!
//! Bootstrap-authored throws (`bootstrap.rs`) all set a `__ag_code`
//! property alongside `name`/`message`; user-thrown values may be
//! anything at all (a string, a number, a plain object with no `name`),
//! so every field here is read defensively and defaulted rather than
//! assumed present.

use agentscript_core::redaction::redact_stack;
use rquickjs::{Ctx, Value};

use crate::result::SafeErrorInfo;

/// Read `name`/`message`/`stack`/`__ag_code` off a caught JS exception
/// value, falling back to stringifying the whole value when it isn't an
/// object (e.g. `throw "boom"` or `throw 42`).
pub fn from_thrown_value(value: &Value<'_>, sanitize_stack_traces: bool) -> SafeErrorInfo {
    if let Some(obj) = value.as_object() {
        let name = obj
            .get::<_, Option<String>>("name")
            .ok()
            .flatten()
            .unwrap_or_else(|| "Error".to_string());
        let message = obj
            .get::<_, Option<String>>("message")
            .ok()
            .flatten()
            .unwrap_or_else(|| "an error occurred".to_string());
        let code = obj
            .get::<_, Option<String>>("__ag_code")
            .ok()
            .flatten()
            .map(map_code_to_static)
            .unwrap_or("EXECUTION_ERROR");
        let stack = obj.get::<_, Option<String>>("stack").ok().flatten();
        let stack = stack.map(|s| {
            if sanitize_stack_traces {
                redact_stack(&s)
            } else {
                s
            }
        });
        return SafeErrorInfo {
            name,
            message,
            code,
            stack,
        };
    }

    let message = value
        .as_string()
        .and_then(|s| s.to_string().ok())
        .unwrap_or_else(|| format!("{value:?}"));
    SafeErrorInfo {
        name: "Error".to_string(),
        message,
        code: "EXECUTION_ERROR",
        stack: None,
    }
}

/// Capture whatever exception is currently pending on `ctx` (spec §3.2
/// invariant 5). Must be called immediately after an `eval`/call returns
/// an error, before any other QuickJS operation runs on this context.
pub fn capture_pending(ctx: &Ctx<'_>, sanitize_stack_traces: bool) -> SafeErrorInfo {
    let caught = ctx.catch();
    from_thrown_value(&caught, sanitize_stack_traces)
}

/// Map a `__ag_code` string (set by bootstrap JS) onto this crate's
/// `'static` wire codes (spec §7), defaulting unknown values to
/// `EXECUTION_ERROR` rather than propagating an arbitrary guest-chosen
/// string as a wire contract code.
fn map_code_to_static(code: String) -> &'static str {
    match code.as_str() {
        "SECURITY_VIOLATION" => "SECURITY_VIOLATION",
        "ITERATION_LIMIT_EXCEEDED" => "ITERATION_LIMIT_EXCEEDED",
        "TOOL_LIMIT_EXCEEDED" => "TOOL_LIMIT_EXCEEDED",
        "CONSOLE_LIMIT_EXCEEDED" => "CONSOLE_LIMIT_EXCEEDED",
        "MEMORY_LIMIT_EXCEEDED" => "MEMORY_LIMIT_EXCEEDED",
        "SANDBOX_ABORTED" => "SANDBOX_ABORTED",
        "VALIDATION_ERROR" => "VALIDATION_ERROR",
        "ENCLAVE_ERROR" => "ENCLAVE_ERROR",
        _ => "EXECUTION_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    #[test]
    fn object_shaped_throw_round_trips_fields() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let value: Value = ctx
                .eval(
                    r#"
                    (function () {
                        const e = new Error("bad things");
                        e.name = "SecurityViolationError";
                        e.__ag_code = "SECURITY_VIOLATION";
                        return e;
                    })()
                    "#,
                )
                .unwrap();
            let info = from_thrown_value(&value, true);
            assert_eq!(info.name, "SecurityViolationError");
            assert_eq!(info.message, "bad things");
            assert_eq!(info.code, "SECURITY_VIOLATION");
        });
    }

    #[test]
    fn string_throw_becomes_generic_error() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let value: Value = ctx.eval(r#" "just a string" "#).unwrap();
            let info = from_thrown_value(&value, true);
            assert_eq!(info.name, "Error");
            assert_eq!(info.message, "just a string");
            assert_eq!(info.code, "EXECUTION_ERROR");
        });
    }

    #[test]
    fn unknown_ag_code_defaults_to_execution_error() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let value: Value = ctx
                .eval(
                    r#"
                    (function () {
                        const e = new Error("weird");
                        e.__ag_code = "NOT_A_REAL_CODE";
                        return e;
                    })()
                    "#,
                )
                .unwrap();
            let info = from_thrown_value(&value, true);
            assert_eq!(info.code, "EXECUTION_ERROR");
        });
    }
}
