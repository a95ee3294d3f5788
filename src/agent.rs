//! Supervisor state machine, configuration, agent state, and the
//! signal-driven runner.

pub mod config;
pub mod runner;
pub mod state;
pub mod supervisor;

pub use config::AgentConfig;
pub use runner::AgentRunner;
pub use state::{AgentState, AgentStatus, CycleResult, LogStatusSink, StatusSink};
pub use supervisor::{AgentEvent, ChannelToken, RpkiAgent};
