//! Execution result and stats (spec §3.1 "Execution result", §6.4).

use serde::Serialize;

/// Counters and timing an execution reports regardless of outcome (spec
/// §3.1, §8.1 invariant 5: monotonically non-decreasing, zero at start).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionStats {
    pub duration_ms: u64,
    pub tool_call_count: u64,
    pub iteration_count: u64,
    pub console_call_count: u64,
    pub console_bytes: u64,
}

/// The `{name, message, code, stack?}` shape a failed execution carries
/// (spec §6.4, §7).
#[derive(Debug, Clone, Serialize)]
pub struct SafeErrorInfo {
    pub name: String,
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// `{ success, value?, error?, stats }` (spec §3.1, §6.4). `success = false`
/// always carries `error` with a fixed-enumeration `code` (spec §6.4).
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SafeErrorInfo>,
    pub stats: ExecutionStats,
}

impl ExecutionResult {
    pub fn ok(value: serde_json::Value, stats: ExecutionStats) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
            stats,
        }
    }

    pub fn failed(error: SafeErrorInfo, stats: ExecutionStats) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error),
            stats,
        }
    }
}
