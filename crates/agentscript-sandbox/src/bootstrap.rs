//! Host-authored JavaScript that runs inside the inner isolate *before* any
//! user code (spec §4.3, §4.4, §4.3.3).
//!
//! This is the same "host authors a JS string, evaluates it once at setup"
//! idiom the stencila `codemode::sandbox::globals` reference uses for
//! `STRIP_GLOBALS_JS` / `SET_TIMEOUT_JS` / `FREEZE_HOST_BRIDGE_JS`: none of
//! this source is reachable or re-enterable by the validated user script,
//! so it is free to use the very intrinsics (`Proxy`, `Reflect`, `Symbol`,
//! `WeakMap`) that `agentscript-validator`'s `DISALLOWED_IDENTIFIER` rule
//! forbids in user source (spec §4.1) — that rule only ever runs over
//! untrusted input, never over this module.
//!
//! Placeholders (`__AG_DENY_LIST__` etc.) are substituted with
//! policy-derived literals at setup time via plain string replacement
//! rather than `format!`, so the JS source itself can use `{}` freely.

use agentscript_core::deny_list::PROXY_DENY_LIST;
use agentscript_core::policy::ProxyConfig;

/// `function __ag_wrap(target, depth)` — the Secure Object Proxy factory
/// (spec §4.4, §4.3.4).
///
/// Depth-bounded: at `depth >= maxDepth` the wrapper becomes opaque (reads
/// return `undefined`, writes silently discard — spec §4.4 bullet 1).
/// Below that, property keys are coerced to string *before* the deny-list
/// check and *before* the underlying read (spec §9 "Key coercion sequence
/// for proxy gets": "coerce-to-string, then deny-list check, then
/// underlying read" — reversing this order reopens the `toString`
/// side-channel in spec §8.3 Scenario G). `__proto__`/`setPrototypeOf` are
/// blocked as an *own* shield on every wrapper (`getPrototypeOf` always
/// returns `null`), not by relying on an inherited deny rule (spec §9
/// "Prototype chains as escape vectors").
const SECURE_PROXY_JS_TEMPLATE: &str = r#"
(function () {
    "use strict";
    const DENY = new Set(__AG_DENY_LIST__);
    const MAX_DEPTH = __AG_MAX_DEPTH__;
    const wrapCache = new WeakMap();

    function isWrappable(v) {
        return v !== null && (typeof v === "object" || typeof v === "function");
    }

    function coerceKey(key) {
        if (typeof key === "symbol") return key;
        try {
            return String(key);
        } catch (_e) {
            return undefined;
        }
    }

    function securityViolation(key) {
        const err = new Error("access to `" + String(key) + "` is not allowed");
        err.name = "SecurityViolationError";
        err.__ag_code = "SECURITY_VIOLATION";
        throw err;
    }

    function opaque() {
        return new Proxy(Object.freeze(Object.create(null)), {
            get() { return undefined; },
            set() { return true; },
            has() { return false; },
            deleteProperty() { return true; },
            ownKeys() { return []; },
            getPrototypeOf() { return null; },
            setPrototypeOf() { return false; },
            defineProperty() { return false; },
            getOwnPropertyDescriptor() { return undefined; },
        });
    }

    function wrap(target, depth) {
        if (!isWrappable(target)) return target;
        if (depth >= MAX_DEPTH) return opaque();

        let cached = wrapCache.get(target);
        if (cached) return cached;

        const handler = {
            get(t, key, _receiver) {
                const k = coerceKey(key);
                if (k === undefined) return undefined;
                if (DENY.has(k)) securityViolation(k);
                if (k === "toJSON") {
                    // Defeat toJSON-hook escapes during host serialization
                    // (spec §4.3.4 last bullet): suppress any real toJSON
                    // and substitute an identity over own-enumerable keys.
                    return function () {
                        const out = {};
                        for (const ownKey of Object.keys(t)) out[ownKey] = t[ownKey];
                        return out;
                    };
                }
                const value = Reflect.get(t, key, t);
                if (typeof value === "function") {
                    return function (...args) {
                        const unwrapped = args.map(unwrapArg);
                        const result = Reflect.apply(value, t, unwrapped);
                        return wrap(result, depth + 1);
                    };
                }
                return wrap(value, depth + 1);
            },
            set(t, key, value) {
                const k = coerceKey(key);
                if (k === undefined) return true;
                if (DENY.has(k)) securityViolation(k);
                Reflect.set(t, key, unwrapArg(value));
                return true;
            },
            has(t, key) {
                const k = coerceKey(key);
                if (k !== undefined && DENY.has(k)) return false;
                return Reflect.has(t, key);
            },
            deleteProperty() {
                return false;
            },
            ownKeys(t) {
                return Reflect.ownKeys(t).filter((k) => !DENY.has(String(k)));
            },
            getOwnPropertyDescriptor(t, key) {
                const k = coerceKey(key);
                if (k !== undefined && DENY.has(k)) return undefined;
                const d = Reflect.getOwnPropertyDescriptor(t, key);
                if (d && "value" in d) d.value = wrap(d.value, depth + 1);
                if (d) d.configurable = true;
                return d;
            },
            getPrototypeOf() {
                return null;
            },
            setPrototypeOf() {
                return false;
            },
            defineProperty() {
                return false;
            },
        };

        const proxy = new Proxy(target, handler);
        wrapCache.set(target, proxy);
        return proxy;
    }

    function unwrapArg(v) {
        // Values constructed inside this isolate are never actually proxies
        // of *this* factory's making crossing back in (everything stays in
        // one context); kept as the identity hook the inner/outer boundary
        // bullet in spec §4.3.4 calls for, so a future multi-context
        // embedding has one place to intercept.
        return v;
    }

    globalThis.__ag_wrap = wrap;
})();
"#;

/// `__ag_safe_stringify(value, maxDepth, maxProps)` — deep sanitization
/// (spec §4.3.5): depth- and property-count-capped, replaces cycles with
/// the literal string `"[Circular]"`, strips functions/symbols, copies any
/// `__proto__` *own property* of an object literal as an ordinary data
/// property rather than installing a prototype.
const SAFE_STRINGIFY_JS: &str = r#"
(function () {
    "use strict";
    function safeStringify(value, maxDepth, maxProps) {
        const seen = new Set();
        let propCount = 0;

        function walk(v, depth) {
            if (v === null || typeof v !== "object") {
                if (typeof v === "function" || typeof v === "symbol") return undefined;
                return v;
            }
            if (seen.has(v)) return "[Circular]";
            if (depth > maxDepth) {
                const err = new Error("exceeds maximum depth");
                err.__ag_code = "MEMORY_LIMIT_EXCEEDED";
                throw err;
            }
            seen.add(v);
            try {
                if (Array.isArray(v)) {
                    const out = [];
                    for (const item of v) {
                        propCount += 1;
                        if (propCount > maxProps) {
                            const err = new Error("too many properties");
                            err.__ag_code = "MEMORY_LIMIT_EXCEEDED";
                            throw err;
                        }
                        out.push(walk(item, depth + 1));
                    }
                    return out;
                }
                const out = {};
                for (const key of Object.keys(v)) {
                    propCount += 1;
                    if (propCount > maxProps) {
                        const err = new Error("too many properties");
                        err.__ag_code = "MEMORY_LIMIT_EXCEEDED";
                        throw err;
                    }
                    out[key] = walk(v[key], depth + 1);
                }
                return out;
            } finally {
                seen.delete(v);
            }
        }

        const sanitized = walk(value, 0);
        return JSON.stringify(sanitized === undefined ? null : sanitized);
    }

    globalThis.__ag_safe_stringify = safeStringify;
})();
"#;

/// Safe runtime helpers (spec §4.2, §4.3.3, glossary "Safe runtime
/// helper"). Every bounded form the transformer targets lives here;
/// `__ag_host_call_tool`, `__ag_check_iteration`, `__ag_check_aborted`, and
/// `__ag_console_sink` are native Rust functions the executor registers
/// before this script runs (see `executor.rs`).
const SAFE_HELPERS_JS: &str = r#"
(function () {
    "use strict";

    const __ag_loop_break = Symbol("break");
    const __ag_loop_continue = Symbol("continue");
    globalThis.__ag_loop_break = __ag_loop_break;
    globalThis.__ag_loop_continue = __ag_loop_continue;

    function checkNotAborted() {
        if (globalThis.__ag_check_aborted()) {
            const err = new Error("execution was aborted");
            err.name = "SandboxAbortedError";
            err.__ag_code = "SANDBOX_ABORTED";
            throw err;
        }
    }

    function checkIteration() {
        checkNotAborted();
        if (!globalThis.__ag_check_iteration()) {
            const err = new Error("iteration limit exceeded");
            err.name = "IterationLimitError";
            err.__ag_code = "ITERATION_LIMIT_EXCEEDED";
            throw err;
        }
    }

    async function __safe_forOf(iterable, bodyFn) {
        for (const item of iterable) {
            checkIteration();
            const signal = await bodyFn(item);
            if (signal === __ag_loop_break) break;
        }
    }
    globalThis.__safe_forOf = __safe_forOf;

    async function __safe_for(initFn, testFn, updateFn, bodyFn) {
        for (initFn(); testFn(); updateFn()) {
            checkIteration();
            const signal = await bodyFn();
            if (signal === __ag_loop_break) break;
        }
    }
    globalThis.__safe_for = __safe_for;

    async function __safe_while(testFn, bodyFn) {
        while (testFn()) {
            checkIteration();
            const signal = await bodyFn();
            if (signal === __ag_loop_break) break;
        }
    }
    globalThis.__safe_while = __safe_while;

    async function __safe_doWhile(testFn, bodyFn) {
        do {
            checkIteration();
            const signal = await bodyFn();
            if (signal === __ag_loop_break) break;
        } while (testFn());
    }
    globalThis.__safe_doWhile = __safe_doWhile;

    function chargeBytes(n) {
        if (!globalThis.__ag_charge_bytes(n)) {
            const err = new Error("memory ceiling exceeded");
            err.name = "MemoryLimitError";
            err.__ag_code = "MEMORY_LIMIT_EXCEEDED";
            throw err;
        }
    }

    function coerceToString(v) {
        if (typeof v === "string") return v;
        try {
            return String(v);
        } catch (_e) {
            return "";
        }
    }

    function __safe_concat(...parts) {
        const strings = parts.map(coerceToString);
        const total = strings.reduce((n, s) => n + s.length, 0);
        chargeBytes(total);
        return strings.join("");
    }
    globalThis.__safe_concat = __safe_concat;

    function __safe_template(quasis, ...exprs) {
        let out = "";
        let total = 0;
        for (let i = 0; i < quasis.length; i++) {
            total += quasis[i].length;
            out += quasis[i];
            if (i < exprs.length) {
                const s = coerceToString(exprs[i]);
                total += s.length;
                out += s;
            }
        }
        chargeBytes(total);
        return out;
    }
    globalThis.__safe_template = __safe_template;

    function stringifyForConsole(args) {
        const parts = args.map((a) => {
            if (typeof a === "string") return a;
            try {
                return globalThis.__ag_safe_stringify(a, 10, 1000);
            } catch (_e) {
                return "[Unserializable]";
            }
        });
        return parts.join(" ");
    }

    function makeConsoleMethod(level) {
        return function (...args) {
            const payload = stringifyForConsole(args);
            if (!globalThis.__ag_console_sink(level, payload)) {
                const err = new Error("console output limit exceeded");
                err.name = "ConsoleLimitError";
                err.__ag_code = "CONSOLE_LIMIT_EXCEEDED";
                throw err;
            }
        };
    }

    globalThis.console = Object.freeze({
        log: makeConsoleMethod("log"),
        info: makeConsoleMethod("info"),
        warn: makeConsoleMethod("warn"),
        error: makeConsoleMethod("error"),
    });

    // `__ref(id)` resolves a sidecar handle `extract_large_strings`
    // produced back to the original string (spec §4.2 last bullet,
    // §9 Open Question: "the only contract is that they resolve to the
    // original string on access and that resolution is budgeted").
    // `__ag_resolve_ref` charges the resolved length against the memory
    // ceiling the same way `__safe_concat`/`__safe_template` do, so a
    // program that resolves the same handle in a loop still pays per call.
    function __ref(id) {
        const resolved = globalThis.__ag_resolve_ref(id);
        if (resolved === null || resolved === undefined) {
            const err = new Error("large-string handle exceeded the memory ceiling or is unknown");
            err.name = "MemoryLimitError";
            err.__ag_code = "MEMORY_LIMIT_EXCEEDED";
            throw err;
        }
        return resolved;
    }
    globalThis.__ref = __ref;

    async function __safe_callTool(name, args) {
        checkNotAborted();
        if (typeof name !== "string") {
            const err = new TypeError("callTool's first argument must be a static string literal");
            err.__ag_code = "VALIDATION_ERROR";
            throw err;
        }
        let argsJson;
        try {
            argsJson = globalThis.__ag_safe_stringify(
                args === undefined ? null : args,
                globalThis.__AG_SANITIZE_DEPTH__,
                globalThis.__AG_SANITIZE_PROPS__,
            );
        } catch (e) {
            throw e;
        }
        const resultJson = await globalThis.__ag_host_call_tool(name, argsJson);
        const envelope = JSON.parse(resultJson);
        if (!envelope.ok) {
            const err = new Error(envelope.message || "tool call failed");
            err.name = envelope.errorName || "ToolError";
            err.__ag_code = envelope.code || "EXECUTION_ERROR";
            throw err;
        }
        return globalThis.__ag_wrap(envelope.value, 0) ?? envelope.value;
    }
    globalThis.__safe_callTool = __safe_callTool;
    globalThis.callTool = __safe_callTool;

    // `parallel([...])` (spec §4.3.3): a fixed-length array of promises
    // already created inside this isolate, run concurrently. An empty
    // array resolves to an empty result rather than throwing (spec §9 Open
    // Question: "treats it as returns an empty result").
    async function parallel(promises) {
        if (!Array.isArray(promises) || promises.length === 0) return [];
        return Promise.all(promises);
    }
    globalThis.parallel = parallel;
})();
"#;

/// Render [`SECURE_PROXY_JS_TEMPLATE`] with `config`'s deny list and depth
/// cap substituted in (spec §4.5's per-level `ProxyConfig`).
pub fn secure_proxy_js(config: &ProxyConfig) -> String {
    let deny_list: Vec<&str> = PROXY_DENY_LIST
        .iter()
        .copied()
        .filter(|name| agentscript_core::deny_list::is_denied_property(name, config))
        .collect();
    let deny_list_js = format!(
        "[{}]",
        deny_list
            .iter()
            .map(|n| format!("{n:?}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    SECURE_PROXY_JS_TEMPLATE
        .replace("__AG_DENY_LIST__", &deny_list_js)
        .replace("__AG_MAX_DEPTH__", &config.max_depth.to_string())
}

pub fn safe_stringify_js() -> &'static str {
    SAFE_STRINGIFY_JS
}

pub fn safe_helpers_js() -> &'static str {
    SAFE_HELPERS_JS
}

/// JS that installs the sanitize-depth/property ceilings as globals the
/// helpers above read (spec §4.3.5 `max_sanitize_depth`,
/// `max_sanitize_properties`).
pub fn sanitize_limits_js(max_depth: u32, max_properties: u32) -> String {
    format!(
        "globalThis.__AG_SANITIZE_DEPTH__ = {max_depth}; globalThis.__AG_SANITIZE_PROPS__ = {max_properties};"
    )
}

/// Curated-global wiring (spec §4.3.1): wraps the intrinsics the inner
/// isolate exposes, then deletes every unwrapped raw binding so the only
/// path to `Math`/`Array`/`Object`/... is through the proxy.
pub const WRAP_CURATED_GLOBALS_JS: &str = r#"
(function () {
    "use strict";
    const names = ["Math", "JSON", "Array", "Object", "String", "Number", "Date"];
    for (const name of names) {
        const original = globalThis[name];
        Object.defineProperty(globalThis, name, {
            value: globalThis.__ag_wrap(original, 0),
            writable: false,
            configurable: false,
            enumerable: true,
        });
    }
})();
"#;

/// Deletes the intrinsics the validator's `DISALLOWED_IDENTIFIER` rule
/// (spec §4.1) already rejects at the source level, as defense-in-depth
/// against a validator bug or a future relaxed preset (spec §9: "the
/// runtime proxy is the backstop for keys that are only knowable at
/// runtime").
///
/// `Proxy`, `Reflect`, `Symbol`, and `Promise` are deliberately NOT in this
/// list even though the validator forbids user source from naming them:
/// `__ag_wrap`'s proxy traps call `Reflect.*` and construct `new Proxy(...)`
/// on every single wrapped property access, the loop/break sentinels are
/// `Symbol`s, and `parallel`/`async function` both need `Promise` — all of
/// it host-authored, none of it reachable by naming those identifiers
/// directly in user source (the validator already closes that door).
pub const STRIP_HAZARD_GLOBALS_JS: &str = r#"
(function () {
    "use strict";
    const hazards = [
        "eval", "Function", "AsyncFunction", "GeneratorFunction", "Generator",
        "WeakRef", "FinalizationRegistry",
        "window", "self", "global", "process", "require",
        "module", "exports", "performance", "SharedArrayBuffer", "Atomics",
        "Worker", "queueMicrotask", "setTimeout", "setInterval", "setImmediate",
        "Map", "Set", "WeakMap", "WeakSet",
    ];
    for (const name of hazards) {
        try {
            delete globalThis[name];
        } catch (_e) {
            // Non-configurable intrinsic; leaving it is safe since the
            // validator already forbids user source from naming it.
        }
    }
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use agentscript_core::policy::{ProxyConfig, SecurityLevel};
    use agentscript_core::SandboxPolicy;

    #[test]
    fn secure_proxy_js_omits_constructor_when_permissive() {
        let permissive = SandboxPolicy::for_level(SecurityLevel::Permissive).proxy_config;
        let js = secure_proxy_js(&permissive);
        assert!(!js.contains("\"constructor\""));
        assert!(js.contains("\"__proto__\""));
    }

    #[test]
    fn secure_proxy_js_includes_constructor_for_strict() {
        let strict = ProxyConfig {
            block_constructor: true,
            block_prototype: true,
            block_legacy_accessors: true,
            max_depth: 5,
        };
        let js = secure_proxy_js(&strict);
        assert!(js.contains("\"constructor\""));
        assert!(js.contains("__AG_MAX_DEPTH__") == false);
        assert!(js.contains("5"));
    }

    #[test]
    fn sanitize_limits_js_renders_both_values() {
        let js = sanitize_limits_js(20, 500);
        assert!(js.contains("20"));
        assert!(js.contains("500"));
    }
}
