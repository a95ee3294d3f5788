//! Agent state and its publication to the host status surface.
//!
//! The state struct is plain data; [`publish`] mirrors it to the host after
//! every transition so the in-memory update and its observable side effect
//! always travel together.

use chrono::{DateTime, Utc};

/// Supervisor lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Init,
    Running,
    Finalising,
    Error,
    Cleanup,
    Sleeping,
    Restarting,
    Shutdown,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Init => "init",
            AgentStatus::Running => "running",
            AgentStatus::Finalising => "finalising",
            AgentStatus::Error => "error",
            AgentStatus::Cleanup => "cleanup",
            AgentStatus::Sleeping => "sleeping",
            AgentStatus::Restarting => "restarting",
            AgentStatus::Shutdown => "shutdown",
        }
    }
}

/// Outcome of the most recent refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    Ok,
    Failed,
}

impl CycleResult {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleResult::Ok => "ok",
            CycleResult::Failed => "failed",
        }
    }
}

/// The supervisor's own bookkeeping. Mutated only by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentState {
    pub status: AgentStatus,
    pub result: Option<CycleResult>,
    pub last_start: Option<DateTime<Utc>>,
    pub last_end: Option<DateTime<Utc>>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            status: AgentStatus::Init,
            result: None,
            last_start: None,
            last_end: None,
        }
    }
}

/// Host status surface, write-only from the agent's point of view.
pub trait StatusSink: Send + Sync {
    fn status_set(&self, key: &str, value: &str);

    /// Called once, after cleanup, when the agent shuts down.
    fn shutdown_complete(&self) {}
}

/// Default sink: status writes go to the trace log only.
#[derive(Debug, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn status_set(&self, key: &str, value: &str) {
        tracing::info!(key, value, "status");
    }

    fn shutdown_complete(&self) {
        tracing::info!("shutdown complete");
    }
}

/// Mirrors the current state to the host status surface.
pub fn publish(sink: &dyn StatusSink, state: &AgentState) {
    sink.status_set("status", state.status.as_str());
    if let Some(result) = state.result {
        sink.status_set("result", result.as_str());
    }
    if let Some(ts) = state.last_start {
        sink.status_set("last_start", &ts.to_rfc3339());
    }
    if let Some(ts) = state.last_end {
        sink.status_set("last_end", &ts.to_rfc3339());
    }
}
