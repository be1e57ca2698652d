//! Validation issues and results.
//!
//! Mirrors the shape of `skilllite-sandbox::security::types::{SecurityIssue,
//! ScanResult}` one level up: a fixed-enumeration code, a severity, an
//! optional source location, and a human-readable message, collected into a
//! result that is valid iff nothing of `error` severity was found.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a single validation issue.
///
/// Unlike the teacher's four-level `SecuritySeverity` (Low/Medium/High/
/// Critical), the AST validator's contract (spec §3.1) only distinguishes
/// `error` (rejects the source) from `warning` (reported but non-blocking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// The fixed enumeration of validation rule codes (spec §4.1) plus the
/// codes a `parseError` never needs but a diagnostic renderer still wants
/// a name for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
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

impl IssueCode {
    /// The wire-contract string for this code, as referenced by §6.5 and the
    /// glossary's "Issue code" entry.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::DisallowedIdentifier => "DISALLOWED_IDENTIFIER",
            IssueCode::UnknownGlobal => "UNKNOWN_GLOBAL",
            IssueCode::NoMetaProgramming => "NO_META_PROGRAMMING",
            IssueCode::NoComputedConstructor => "NO_COMPUTED_CONSTRUCTOR",
            IssueCode::NoComputedDestructuring => "NO_COMPUTED_DESTRUCTURING",
            IssueCode::NoFunctionDecl => "NO_FUNCTION_DECL",
            IssueCode::NoRegexLiteral => "NO_REGEX_LITERAL",
            IssueCode::JsonCallbackNotAllowed => "JSON_CALLBACK_NOT_ALLOWED",
            IssueCode::ResourceExhaustion => "RESOURCE_EXHAUSTION",
            IssueCode::InfiniteLoop => "INFINITE_LOOP",
            IssueCode::NoGlobalAccess => "NO_GLOBAL_ACCESS",
            IssueCode::SecurityViolation => "SECURITY_VIOLATION",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(start, end, line)` source span, carried by an `Issue` when the
/// violating construct can be pinned to a location (spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start: u32,
    pub end: u32,
    pub line: u32,
}

/// A single validation issue, as returned by `validate()` (spec §3.1, §6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub code: IssueCode,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Issue {
    pub fn error(code: IssueCode, message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: Severity::Error,
            location,
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: Severity::Warning,
            location,
        }
    }
}

/// The result of `validate()` (spec §3.1, §6.5).
///
/// `valid` is true iff no issue has `Severity::Error` and no parse error
/// occurred. The validator never throws on well-formed input (spec §4.1
/// "Failure semantics"): a parse failure surfaces here as `parse_error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl ValidationResult {
    pub fn from_parse_error(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            issues: Vec::new(),
            parse_error: Some(message.into()),
        }
    }

    pub fn from_issues(issues: Vec<Issue>) -> Self {
        let valid = !issues.iter().any(|i| i.severity == Severity::Error);
        Self {
            valid,
            issues,
            parse_error: None,
        }
    }
}
