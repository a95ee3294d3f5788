use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use reqwest::StatusCode;
use rpki_agent::{AgentEvent, RpkiAgent};
use tokio::time::{timeout, Duration};
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Dispatches agent events the way the runner does, until `pred` holds.
pub async fn drive_until(
    agent: &mut RpkiAgent,
    pred: impl Fn(&RpkiAgent) -> bool,
) -> Result<()> {
    timeout(Duration::from_secs(15), async {
        while !pred(agent) {
            match agent.next_event().await {
                AgentEvent::Timer => agent.on_timeout().await,
                AgentEvent::Readable(token) => agent.on_readable(token).await?,
                AgentEvent::Disabled => bail!("agent was disabled while being driven"),
            }
        }
        Ok(())
    })
    .await
    .context("timed out driving the agent")?
}

pub async fn get(url: &str) -> Result<(StatusCode, String)> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("GET {url} failed"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("reading the body of {url} failed"))?;
    Ok((status, body))
}
