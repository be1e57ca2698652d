//! The fixed rule set (spec §4.1).
//!
//! Each rule is a tagged variant plus the data it needs, not a class in a
//! trait-object hierarchy (spec §9, "Rule representation" open question,
//! resolved toward data + free functions): a `Rule` is checked against the
//! AST by a single visitor (see [`crate::visitor`]), appending an `Issue`
//! per violation it finds. This keeps the set closed and inspectable the
//! way `skilllite-sandbox::security::rules::SecurityRule` is a plain struct
//! rather than a `dyn Rule` trait object.

use agentscript_core::IssueCode;

/// One entry in the fixed validation rule set (spec §4.1 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    DisallowedIdentifier,
    UnknownGlobal,
    NoMetaProgramming,
    NoComputedConstructor,
    NoComputedDestructuring,
    NoFunctionDecl,
    NoRegexLiteral,
    JsonCallbackNotAllowed,
    ResourceExhaustion,
    InfiniteLoop,
    NoGlobalAccess,
    SecurityViolation,
}

impl Rule {
    pub fn code(&self) -> IssueCode {
        match self {
            Rule::DisallowedIdentifier => IssueCode::DisallowedIdentifier,
            Rule::UnknownGlobal => IssueCode::UnknownGlobal,
            Rule::NoMetaProgramming => IssueCode::NoMetaProgramming,
            Rule::NoComputedConstructor => IssueCode::NoComputedConstructor,
            Rule::NoComputedDestructuring => IssueCode::NoComputedDestructuring,
            Rule::NoFunctionDecl => IssueCode::NoFunctionDecl,
            Rule::NoRegexLiteral => IssueCode::NoRegexLiteral,
            Rule::JsonCallbackNotAllowed => IssueCode::JsonCallbackNotAllowed,
            Rule::ResourceExhaustion => IssueCode::ResourceExhaustion,
            Rule::InfiniteLoop => IssueCode::InfiniteLoop,
            Rule::NoGlobalAccess => IssueCode::NoGlobalAccess,
            Rule::SecurityViolation => IssueCode::SecurityViolation,
        }
    }

    /// All rules run on every validation pass; none is individually
    /// disable-able (spec §4.1 carries no "disabled_rules" concept, unlike
    /// the teacher's regex rule set — the validator's set is closed).
    pub const ALL: &'static [Rule] = &[
        Rule::DisallowedIdentifier,
        Rule::UnknownGlobal,
        Rule::NoMetaProgramming,
        Rule::NoComputedConstructor,
        Rule::NoComputedDestructuring,
        Rule::NoFunctionDecl,
        Rule::NoRegexLiteral,
        Rule::JsonCallbackNotAllowed,
        Rule::ResourceExhaustion,
        Rule::InfiniteLoop,
        Rule::NoGlobalAccess,
        Rule::SecurityViolation,
    ];
}

/// Options that narrow or widen what the rule set accepts (spec §6.1's
/// `validate(source, options?)` contract). Mirrors the preset composition
/// in spec §4.1 ("ordered rule list, allowed-globals set, loop-kind
/// allowlist, JSON-callback policy, resource-exhaustion ceiling, and flags
/// for `allowFunctions`, `allowRegex`").
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// Extra identifiers treated as known globals, beyond
    /// `agentscript_core::deny_list::DEFAULT_ALLOWED_GLOBALS` (spec §4.3.1
    /// custom globals, surfaced here so `UNKNOWN_GLOBAL` doesn't fire on
    /// them).
    pub custom_globals: Vec<String>,
    /// Allow top-level `function` declarations (spec §4.1
    /// `NO_FUNCTION_DECL` is normally an error; some embedders pre-transform
    /// and only need the warning).
    pub allow_function_declarations: bool,
    /// Allow regex literals (spec §4.1 `NO_REGEX_LITERAL`, preset flag
    /// `allowRegex`). Off for every shipped preset; exposed for embedders
    /// that pre-filter regex some other way.
    pub allow_regex: bool,
    /// `Array(n).fill(...)` / `new Array(n).fill(...)` / `"s".repeat(n)`
    /// above this literal `n` trip `RESOURCE_EXHAUSTION` as an error; a
    /// non-constant `n` is a warning in permissive presets and an error
    /// otherwise (spec §4.1 `RESOURCE_EXHAUSTION` row).
    pub resource_exhaustion_ceiling: u64,
    /// Permissive presets downgrade a non-constant `n` in a resource-shaped
    /// call to a warning instead of an error (spec §4.1 `RESOURCE_EXHAUSTION`
    /// row, "warn in permissive presets, error otherwise").
    pub permissive_resource_exhaustion: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            custom_globals: Vec::new(),
            allow_function_declarations: false,
            allow_regex: false,
            resource_exhaustion_ceiling: 10_000,
            permissive_resource_exhaustion: false,
        }
    }
}
