//! Name tables shared by the validator (static checks) and the secure
//! object proxy (runtime backstop) — spec §4.1, §4.4, §9.
//!
//! Keeping these as plain `&[&str]` constants in one place, rather than on
//! either consumer, follows the same "single source of truth constants
//! module" shape as `skilllite-sandbox::security::policy`'s
//! `MANDATORY_DENY_*` tables, which are consumed by multiple platform
//! backends from one canonical list.

/// Identifiers that `DISALLOWED_IDENTIFIER` rejects outright (spec §4.1
/// table, row 1). `Promise` is included per the identifier itself being
/// disallowed while `async`/`await` remain legal (spec §9 Open Question 1).
pub const DISALLOWED_IDENTIFIERS: &[&str] = &[
    "constructor",
    "prototype",
    "__proto__",
    "eval",
    "Function",
    "AsyncFunction",
    "GeneratorFunction",
    "Generator",
    "Proxy",
    "Reflect",
    "Symbol",
    "WeakRef",
    "FinalizationRegistry",
    "globalThis",
    "window",
    "self",
    "global",
    "process",
    "require",
    "module",
    "exports",
    "import",
    "performance",
    "SharedArrayBuffer",
    "Atomics",
    "Worker",
    "queueMicrotask",
    "setTimeout",
    "setInterval",
    "setImmediate",
    "Map",
    "Set",
    "WeakMap",
    "WeakSet",
    "Promise",
];

/// Member-expression property names that trip `NO_META_PROGRAMMING` (spec
/// §4.1 table, row 3).
pub const META_PROGRAMMING_PROPERTIES: &[&str] = &[
    "setPrototypeOf",
    "getPrototypeOf",
    "defineProperty",
    "defineProperties",
    "getOwnPropertyDescriptor",
    "getOwnPropertyDescriptors",
    "getOwnPropertyNames",
    "getOwnPropertySymbols",
];

/// String values that a computed property key must never statically or
/// dynamically evaluate to (spec §4.1 `NO_COMPUTED_CONSTRUCTOR`, §4.4 deny
/// list, §9 "Dynamic identifier-like constructs").
pub const FORBIDDEN_KEY_STRINGS: &[&str] = &["constructor", "__proto__", "prototype"];

/// The secure object proxy's runtime deny list (spec §4.4, glossary "Deny
/// list"). A configurable subset of this set is actually enforced per
/// `ProxyConfig` (`block_constructor`, `block_prototype`,
/// `block_legacy_accessors`).
pub const PROXY_DENY_LIST: &[&str] = &[
    "constructor",
    "__proto__",
    "prototype",
    "__lookupGetter__",
    "__lookupSetter__",
    "__defineGetter__",
    "__defineSetter__",
];

/// Names the curated global environment exposes by default (spec §4.3.1),
/// before custom globals and their `__safe_` twins (spec §4.2) are added.
pub const DEFAULT_ALLOWED_GLOBALS: &[&str] = &[
    "Math",
    "JSON",
    "Array",
    "Object",
    "String",
    "Number",
    "Date",
    "console",
    "callTool",
    "parallel",
    "undefined",
    "NaN",
    "Infinity",
    "__safe_callTool",
    "__safe_forOf",
    "__safe_for",
    "__safe_while",
    "__safe_doWhile",
    "__safe_concat",
    "__safe_template",
    "__safe_console",
    "__ag_main",
];

/// Whether `name` belongs to the proxy deny list that `config` actually
/// enforces (spec §4.4: "configurable subset of `{...}` controlled by
/// preset"). Used by both the validator's computed-constructor rule and
/// the runtime proxy's property-access mediation.
pub fn is_denied_property(name: &str, config: &crate::policy::ProxyConfig) -> bool {
    match name {
        "constructor" => config.block_constructor,
        "__proto__" | "prototype" => config.block_prototype,
        "__lookupGetter__" | "__lookupSetter__" | "__defineGetter__" | "__defineSetter__" => {
            config.block_legacy_accessors
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ProxyConfig, SecurityLevel};
    use crate::policy::SandboxPolicy;

    #[test]
    fn deny_list_honors_proxy_config_flags() {
        let permissive = SandboxPolicy::for_level(SecurityLevel::Permissive).proxy_config;
        assert!(!is_denied_property("constructor", &permissive));
        assert!(is_denied_property("__proto__", &permissive));

        let strict = SandboxPolicy::for_level(SecurityLevel::Strict).proxy_config;
        assert!(is_denied_property("constructor", &strict));
    }

    #[test]
    fn proxy_config_field_is_unused_elsewhere() {
        let cfg = ProxyConfig {
            block_constructor: false,
            block_prototype: false,
            block_legacy_accessors: false,
            max_depth: 1,
        };
        assert!(!is_denied_property("__lookupGetter__", &cfg));
    }
}
