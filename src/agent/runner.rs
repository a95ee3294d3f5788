use anyhow::Result;
use std::sync::Arc;
use tokio::signal;

use super::config::AgentConfig;
use super::state::{LogStatusSink, StatusSink};
use super::supervisor::{AgentEvent, RpkiAgent};

/// Drives an [`RpkiAgent`] event loop and handles OS signals for graceful
/// shutdowns.
pub struct AgentRunner {
    agent: RpkiAgent,
}

impl AgentRunner {
    /// Creates a runner whose state publications go to the process log only.
    pub fn new(config: AgentConfig) -> Self {
        Self::with_sink(config, Arc::new(LogStatusSink))
    }

    /// Creates a runner with a caller-provided status surface, for hosts that
    /// mirror agent state somewhere other than the log.
    pub fn with_sink(config: AgentConfig, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            agent: RpkiAgent::new(config, sink),
        }
    }

    pub fn agent(&self) -> &RpkiAgent {
        &self.agent
    }

    /// Runs the agent until a Ctrl-C (SIGINT) is received or the agent is
    /// disabled through its [`RpkiAgent::disable_handle`] token.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.agent.on_initialized().await?;
        tracing::info!("agent started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        loop {
            let event = tokio::select! {
                _ = signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received; shutting down agent");
                    AgentEvent::Disabled
                }
                event = self.agent.next_event() => event,
            };
            match event {
                AgentEvent::Timer => self.agent.on_timeout().await,
                AgentEvent::Readable(token) => self.agent.on_readable(token).await?,
                AgentEvent::Disabled => {
                    self.agent.on_enabled(false).await;
                    return Ok(());
                }
            }
        }
    }
}
