//! The closed sandbox error taxonomy (spec §7).
//!
//! One `thiserror` enum per wire-contract error code, mirroring
//! `skilllite-sandbox`'s pattern of a single `#[derive(thiserror::Error)]`
//! enum whose variants carry their own fixed code string rather than
//! deriving it from the variant name at the call site.

use thiserror::Error;

/// Every error the sandbox pipeline can surface to a caller (spec §6.4,
/// §7). `success = false` responses always carry one of these as
/// `error.code`; this enum is closed by design, not merely "currently
/// complete" (`SCORING_BLOCKED` is reserved and never constructed by this
/// crate's pipeline — spec §7, last row).
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("security violation: {0}")]
    SecurityViolation(String),

    #[error("iteration limit exceeded: {0}")]
    IterationLimitExceeded(String),

    #[error("tool call limit exceeded: {0}")]
    ToolLimitExceeded(String),

    #[error("console output limit exceeded: {0}")]
    ConsoleLimitExceeded(String),

    #[error("memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),

    #[error("sandbox aborted: {0}")]
    SandboxAborted(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("enclave error: {0}")]
    Enclave(String),

    /// Reserved for a future scoring subsystem (spec §7, out of scope).
    /// Never constructed here; kept so the taxonomy stays a single closed
    /// enum rather than growing a second "extended" error type later.
    #[error("scoring blocked: {0}")]
    ScoringBlocked(String),
}

impl SandboxError {
    /// The fixed wire-contract code for this variant (spec §6.4, §7).
    pub fn code(&self) -> &'static str {
        match self {
            SandboxError::Validation(_) => "VALIDATION_ERROR",
            SandboxError::SecurityViolation(_) => "SECURITY_VIOLATION",
            SandboxError::IterationLimitExceeded(_) => "ITERATION_LIMIT_EXCEEDED",
            SandboxError::ToolLimitExceeded(_) => "TOOL_LIMIT_EXCEEDED",
            SandboxError::ConsoleLimitExceeded(_) => "CONSOLE_LIMIT_EXCEEDED",
            SandboxError::MemoryLimitExceeded(_) => "MEMORY_LIMIT_EXCEEDED",
            SandboxError::SandboxAborted(_) => "SANDBOX_ABORTED",
            SandboxError::Execution(_) => "EXECUTION_ERROR",
            SandboxError::Enclave(_) => "ENCLAVE_ERROR",
            SandboxError::ScoringBlocked(_) => "SCORING_BLOCKED",
        }
    }

    /// The message half of the `{code, message}` pair returned to callers,
    /// with stack-trace-shaped content redacted per policy (spec §7 step 3).
    pub fn sanitized_message(&self, sanitize: bool) -> String {
        let raw = self.to_string();
        if sanitize {
            crate::redaction::redact_stack(&raw)
        } else {
            raw
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

impl SandboxError {
    /// Build the `{code, message}` response shape a CLI or embedder renders
    /// on failure (spec §6.4).
    pub fn to_response(&self, sanitize_stack_traces: bool) -> ErrorResponse {
        ErrorResponse {
            code: self.code(),
            message: self.sanitized_message(sanitize_stack_traces),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_its_fixed_code() {
        assert_eq!(SandboxError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(
            SandboxError::SecurityViolation("x".into()).code(),
            "SECURITY_VIOLATION"
        );
        assert_eq!(
            SandboxError::IterationLimitExceeded("x".into()).code(),
            "ITERATION_LIMIT_EXCEEDED"
        );
        assert_eq!(
            SandboxError::ToolLimitExceeded("x".into()).code(),
            "TOOL_LIMIT_EXCEEDED"
        );
        assert_eq!(
            SandboxError::ConsoleLimitExceeded("x".into()).code(),
            "CONSOLE_LIMIT_EXCEEDED"
        );
        assert_eq!(
            SandboxError::MemoryLimitExceeded("x".into()).code(),
            "MEMORY_LIMIT_EXCEEDED"
        );
        assert_eq!(SandboxError::SandboxAborted("x".into()).code(), "SANDBOX_ABORTED");
        assert_eq!(SandboxError::Execution("x".into()).code(), "EXECUTION_ERROR");
        assert_eq!(SandboxError::Enclave("x".into()).code(), "ENCLAVE_ERROR");
        assert_eq!(SandboxError::ScoringBlocked("x".into()).code(), "SCORING_BLOCKED");
    }

    #[test]
    fn sanitized_message_redacts_paths() {
        let err = SandboxError::Execution("failed at /home/alice/script.js".into());
        let sanitized = err.sanitized_message(true);
        assert!(!sanitized.contains("/home/alice"));
        let unsanitized = err.sanitized_message(false);
        assert!(unsanitized.contains("/home/alice"));
    }
}
