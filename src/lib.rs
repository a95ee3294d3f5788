pub mod agent;
pub mod fetch;
pub mod listener;
pub mod task;
pub mod telemetry;
pub mod vrp;
pub mod worker;

pub use agent::config::AgentConfig;
pub use agent::runner::AgentRunner;
pub use agent::state::{AgentState, AgentStatus, CycleResult, LogStatusSink, StatusSink};
pub use agent::supervisor::{AgentEvent, ChannelToken, RpkiAgent};
pub use fetch::{CacheClient, FetchError};
pub use listener::{ListenerHandle, PolicyView};
pub use task::ChildTask;
pub use telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use vrp::{minimal_cover, Afi, Asn, FilterEntry, PrefixRule, Vrp, VrpSet};
pub use worker::{CycleStats, WorkerHandle, WorkerReport};
