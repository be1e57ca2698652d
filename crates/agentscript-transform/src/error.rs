use thiserror::Error;

/// Failures the transform stage can surface (spec §4.2, §7
/// `VALIDATION_ERROR` — the transformer only ever runs on source the
/// validator already accepted, so a failure here means the two stages'
/// grammars disagree, not that user input was malicious).
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to parse source before transform: {0}")]
    Parse(String),

    #[error("failed to generate source after transform: {0}")]
    Codegen(String),
}
