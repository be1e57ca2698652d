//! Per-execution state: the "Execution context" of spec §3.1.
//!
//! Everything here is the Rust-side half of the "outer isolate" (spec
//! §4.3.1): counters, the abort flag, and the operation-name history are
//! owned here and only ever mutated through the bridge functions the inner
//! context's safe-runtime helpers call (spec §5 "Shared-resource policy").
//! Counters are `Arc<AtomicU64>` rather than plain fields because the
//! wall-clock watchdog (a separate tokio task) and the inner context's
//! native bridge functions touch them from different call sites.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use agentscript_core::SandboxPolicy;
use uuid::Uuid;

/// Counters and timing tracked across one execution (spec §3.1, §8.1
/// invariant 5: monotonically non-decreasing, zero at start).
#[derive(Debug, Default)]
pub struct Counters {
    pub iterations: AtomicU64,
    pub tool_calls: AtomicU64,
    pub console_calls: AtomicU64,
    pub console_bytes: AtomicU64,
    pub allocated_bytes: AtomicU64,
}

/// Per-session state for one `execute()` call (spec §3.1 "Execution
/// context"). Shared (`Arc`) between the tokio task driving the QuickJS
/// event loop, the wall-clock watchdog task, and every native bridge
/// function registered into the inner isolate.
pub struct ExecutionContext {
    pub session_id: Uuid,
    pub policy: SandboxPolicy,
    pub counters: Counters,
    pub aborted: AtomicBool,
    pub abort_reason: Mutex<Option<String>>,
    pub start: Instant,
    /// Tool-call names in program declaration order, for the session-unique
    /// call identifier correlation spec §5 requires ("the order of promise
    /// construction"). Append-only for the lifetime of one execution.
    pub op_history: Mutex<Vec<String>>,
}

impl ExecutionContext {
    pub fn new(policy: SandboxPolicy) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            policy,
            counters: Counters::default(),
            aborted: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
            start: Instant::now(),
            op_history: Mutex::new(Vec::new()),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Set the abort flag exactly once; later callers lose the race and
    /// their reason is discarded (the first cause wins, per spec §5
    /// "Cancellation": deadline, explicit abort, or resource breach).
    pub fn abort(&self, reason: impl Into<String>) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            *self.abort_reason.lock().expect("abort_reason mutex poisoned") = Some(reason.into());
        }
    }

    pub fn abort_reason(&self) -> Option<String> {
        self.abort_reason.lock().expect("abort_reason mutex poisoned").clone()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Record one iteration step; returns `false` once the ceiling is
    /// reached (spec §4.3.3 `__safe_forOf`/`__safe_for`/`__safe_while`/
    /// `__safe_doWhile`: "fails with `ITERATION_LIMIT_EXCEEDED` at the
    /// ceiling"). Unlike `charge_bytes`, the breaching attempt is rolled
    /// back so the counter reports exactly the ceiling, not one past it
    /// (spec §8.3 Scenario C pins `stats.tool_call_count` at the ceiling
    /// value, not ceiling+1).
    pub fn tick_iteration(&self) -> bool {
        let n = self.counters.iterations.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.policy.max_iterations {
            true
        } else {
            self.counters.iterations.fetch_sub(1, Ordering::SeqCst);
            false
        }
    }

    /// Record one tool call; returns `false` once the ceiling is reached
    /// (spec §4.3.3 `__safe_callTool`). See `tick_iteration` for why the
    /// breaching attempt rolls back.
    pub fn tick_tool_call(&self) -> bool {
        let n = self.counters.tool_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.policy.max_tool_calls {
            true
        } else {
            self.counters.tool_calls.fetch_sub(1, Ordering::SeqCst);
            false
        }
    }

    /// Record one console call plus its payload size; returns `false`
    /// once either ceiling is reached (spec §4.3.3 `__safe_console`). Both
    /// counters roll back on breach, same as `tick_iteration`/`tick_tool_call`.
    pub fn tick_console(&self, payload_bytes: u64) -> bool {
        let calls = self.counters.console_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let bytes = self.counters.console_bytes.fetch_add(payload_bytes, Ordering::SeqCst) + payload_bytes;
        let ok = calls <= self.policy.max_console_calls && bytes <= self.policy.max_console_output_bytes;
        if !ok {
            self.counters.console_calls.fetch_sub(1, Ordering::SeqCst);
            self.counters
                .console_bytes
                .fetch_sub(payload_bytes, Ordering::SeqCst);
        }
        ok
    }

    /// Charge `bytes` against the cumulative allocation ceiling *before*
    /// the allocation happens (spec §4.3.6: "A ceiling breach throws the
    /// dedicated resource error before the allocation happens; partial
    /// state is preserved — the counter is not rolled back").
    pub fn charge_bytes(&self, bytes: u64) -> bool {
        let total = self.counters.allocated_bytes.fetch_add(bytes, Ordering::SeqCst) + bytes;
        total <= self.policy.memory_ceiling_bytes
    }

    pub fn record_op(&self, name: &str) -> usize {
        let mut history = self.op_history.lock().expect("op_history mutex poisoned");
        history.push(name.to_string());
        history.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentscript_core::SecurityLevel;

    #[test]
    fn counters_start_at_zero() {
        let ctx = ExecutionContext::new(SandboxPolicy::for_level(SecurityLevel::Standard));
        assert_eq!(ctx.counters.iterations.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.counters.tool_calls.load(Ordering::SeqCst), 0);
        assert!(!ctx.is_aborted());
    }

    #[test]
    fn tick_iteration_respects_ceiling() {
        let mut policy = SandboxPolicy::for_level(SecurityLevel::Strict);
        policy.max_iterations = 2;
        let ctx = ExecutionContext::new(policy);
        assert!(ctx.tick_iteration());
        assert!(ctx.tick_iteration());
        assert!(!ctx.tick_iteration());
        // The breaching attempt rolls back; the counter reads the ceiling,
        // not one past it.
        assert_eq!(ctx.counters.iterations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tick_tool_call_rolls_back_on_breach() {
        let mut policy = SandboxPolicy::for_level(SecurityLevel::Strict);
        policy.max_tool_calls = 3;
        let ctx = ExecutionContext::new(policy);
        assert!(ctx.tick_tool_call());
        assert!(ctx.tick_tool_call());
        assert!(ctx.tick_tool_call());
        assert!(!ctx.tick_tool_call());
        assert_eq!(ctx.counters.tool_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn charge_bytes_does_not_roll_back_on_breach() {
        let mut policy = SandboxPolicy::for_level(SecurityLevel::Strict);
        policy.memory_ceiling_bytes = 100;
        let ctx = ExecutionContext::new(policy);
        assert!(ctx.charge_bytes(90));
        assert!(!ctx.charge_bytes(50));
        // Partial progress is not refunded (spec §4.3.6).
        assert_eq!(ctx.counters.allocated_bytes.load(Ordering::SeqCst), 140);
    }

    #[test]
    fn abort_first_reason_wins() {
        let ctx = ExecutionContext::new(SandboxPolicy::for_level(SecurityLevel::Standard));
        ctx.abort("timeout");
        ctx.abort("resource");
        assert_eq!(ctx.abort_reason().as_deref(), Some("timeout"));
    }

    #[test]
    fn record_op_assigns_declaration_order_ids() {
        let ctx = ExecutionContext::new(SandboxPolicy::for_level(SecurityLevel::Standard));
        assert_eq!(ctx.record_op("search"), 0);
        assert_eq!(ctx.record_op("save"), 1);
    }
}
