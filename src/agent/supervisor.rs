//! The supervisor: an event-driven control loop owning the refresh cycle and
//! the lifecycles of the fetch worker and the policy listener.
//!
//! The loop is single-threaded and never reads a channel synchronously:
//! [`RpkiAgent::next_event`] registers interest in channel readiness and the
//! refresh timer, and every wake-up is dispatched through the same small set
//! of entry points (`on_timeout`, `on_readable`, ...) that an external host
//! adapter could also drive directly. The only wait on a child is the
//! join inside cleanup, bounded by the child's cancellation latency.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Error, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::config::AgentConfig;
use super::state::{self, AgentState, AgentStatus, CycleResult, StatusSink};
use crate::fetch::CacheClient;
use crate::listener::{self, ListenerHandle};
use crate::telemetry::Telemetry;
use crate::worker::{CycleStats, WorkerHandle, WorkerReport};

/// Identifies which watched channel became readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelToken {
    WorkerData,
    WorkerError,
    ListenerError,
}

/// A wake-up delivered to the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentEvent {
    /// The refresh timer fired.
    Timer,
    /// A watched channel is readable (or was closed by its writer).
    Readable(ChannelToken),
    /// The host disabled the agent.
    Disabled,
}

/// Which child a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Child {
    Worker,
    Listener,
}

impl Child {
    fn as_str(self) -> &'static str {
        match self {
            Child::Worker => "worker",
            Child::Listener => "listener",
        }
    }
}

/// Payloads drained while multiplexing, consumed by `on_readable`.
#[derive(Default)]
struct PendingEvents {
    worker_data: Option<WorkerReport>,
    worker_err: Option<Error>,
    listener_err: Option<Error>,
}

pub struct RpkiAgent {
    config: AgentConfig,
    state: AgentState,
    sink: Arc<dyn StatusSink>,
    telemetry: Arc<Telemetry>,
    worker: Option<WorkerHandle>,
    listener: Option<ListenerHandle>,
    deadline: Option<Instant>,
    disabled: CancellationToken,
    pending: PendingEvents,
}

impl RpkiAgent {
    pub fn new(config: AgentConfig, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            config,
            state: AgentState::default(),
            sink,
            telemetry: Arc::new(Telemetry::default()),
            worker: None,
            listener: None,
            deadline: None,
            disabled: CancellationToken::new(),
            pending: PendingEvents::default(),
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Address the policy listener is serving on, once it is live.
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(ListenerHandle::addr)
    }

    /// Cancelling this token delivers [`AgentEvent::Disabled`] to the loop.
    pub fn disable_handle(&self) -> CancellationToken {
        self.disabled.clone()
    }

    // --- inbound entry points -------------------------------------------

    /// Host signalled that initialisation is complete: start up.
    pub async fn on_initialized(&mut self) -> Result<()> {
        self.start().await
    }

    /// The refresh timer fired: begin a new cycle.
    pub async fn on_timeout(&mut self) {
        self.run().await;
    }

    /// A configuration option changed. A rejected value aborts only this
    /// assignment; the prior value stays in effect.
    pub fn on_option_changed(&mut self, key: &str, value: &str) {
        if let Err(err) = self.config.set_option(key, value) {
            tracing::error!(key, value, error = format!("{err:#}"), "rejecting option");
        }
    }

    /// Host flipped the agent's admin state.
    pub async fn on_enabled(&mut self, enabled: bool) {
        if enabled {
            tracing::info!("agent enabled");
        } else {
            tracing::info!("agent disabled");
            self.shutdown().await;
        }
    }

    /// A watched channel became readable. Payloads drained by `next_event`
    /// are consumed first; direct callers fall back to a non-blocking read.
    pub async fn on_readable(&mut self, token: ChannelToken) -> Result<()> {
        tracing::debug!(?token, "watched channel is readable");
        match token {
            ChannelToken::WorkerData => {
                let report = self.pending.worker_data.take().or_else(|| {
                    self.worker
                        .as_mut()
                        .and_then(|worker| worker.data_rx.try_recv().ok())
                });
                match report {
                    Some(report) => {
                        self.success(report).await;
                        Ok(())
                    }
                    // data endpoint closed without a message: the worker is
                    // gone, recover whatever it left on the error channel
                    None => self.failure(None, Child::Worker).await,
                }
            }
            ChannelToken::WorkerError => {
                let explicit = self.pending.worker_err.take();
                self.failure(explicit, Child::Worker).await
            }
            ChannelToken::ListenerError => {
                let explicit = self.pending.listener_err.take();
                self.failure(explicit, Child::Listener).await
            }
        }
    }

    // --- event multiplexing ---------------------------------------------

    /// Waits for the next wake-up: a watched channel becoming readable (or
    /// closing), the refresh timer, or the host disable signal.
    pub async fn next_event(&mut self) -> AgentEvent {
        let deadline = self.deadline;
        let Self {
            worker,
            listener,
            disabled,
            pending,
            ..
        } = self;
        let (worker_data, worker_err) = match worker.as_mut() {
            Some(w) => (Some(&mut w.data_rx), Some(&mut w.err_rx)),
            None => (None, None),
        };
        let listener_err = listener.as_mut().map(|l| &mut l.err_rx);

        let event = tokio::select! {
            biased;
            _ = disabled.cancelled() => AgentEvent::Disabled,
            delivery = recv_opt(worker_data) => {
                if let Some(report) = delivery {
                    pending.worker_data = Some(report);
                }
                AgentEvent::Readable(ChannelToken::WorkerData)
            }
            err = recv_opt(worker_err) => {
                if let Some(err) = err {
                    pending.worker_err = Some(err);
                }
                AgentEvent::Readable(ChannelToken::WorkerError)
            }
            err = recv_opt(listener_err) => {
                if let Some(err) = err {
                    pending.listener_err = Some(err);
                }
                AgentEvent::Readable(ChannelToken::ListenerError)
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                AgentEvent::Timer
            }
        };
        if event == AgentEvent::Timer {
            self.deadline = None;
        }
        event
    }

    // --- state machine ---------------------------------------------------

    async fn start(&mut self) -> Result<()> {
        self.set_status(AgentStatus::Init);
        self.init_listener().await?;
        self.run().await;
        Ok(())
    }

    async fn init_listener(&mut self) -> Result<()> {
        tracing::info!("initialising listener");
        let handle = listener::spawn(self.config.listen_address()).await?;
        self.listener = Some(handle);
        Ok(())
    }

    /// Spawns a worker for one refresh cycle, or goes straight back to sleep
    /// when no cache URL is configured.
    async fn run(&mut self) {
        self.set_status(AgentStatus::Running);
        let Some(url) = self.config.cache_url().map(str::to_string) else {
            tracing::warn!("'cache_url' is not set");
            self.sleep();
            return;
        };
        self.mark_last_start();
        tracing::info!("initialising worker");
        match CacheClient::new() {
            Ok(client) => {
                self.worker = Some(WorkerHandle::spawn(client, url));
                tracing::info!("worker started");
            }
            Err(err) => {
                // a failed spawn is an immediate worker failure
                let _ = self.failure(Some(err), Child::Worker).await;
            }
        }
    }

    /// Worker reported: install the new set, record the cycle, reschedule.
    async fn success(&mut self, report: WorkerReport) {
        self.set_status(AgentStatus::Finalising);
        let (stats, vrps) = report;
        match &self.listener {
            Some(listener) => {
                tracing::info!(vrps = vrps.len(), "sending new VRP set to listener");
                if let Err(err) = listener.data_tx.try_send(vrps) {
                    tracing::warn!(error = %err, "could not deliver VRP set to listener");
                }
            }
            None => tracing::warn!("no live listener to deliver the VRP set to"),
        }
        self.report(&stats);
        self.set_result(CycleResult::Ok);
        self.mark_last_end();
        self.telemetry.record_cycle_ok();
        self.cleanup_worker().await;
        self.sleep();
    }

    /// A child failed. Worker failures clean up and reschedule; a listener
    /// failure means the policy surface is down and forces a full restart.
    async fn failure(&mut self, explicit: Option<Error>, child: Child) -> Result<()> {
        self.set_status(AgentStatus::Error);
        let err = match explicit {
            Some(err) => err,
            None => self.take_child_error(child),
        };
        tracing::error!(child = child.as_str(), error = format!("{err:#}"), "child failed");
        self.set_result(CycleResult::Failed);
        self.mark_last_end();
        self.telemetry.record_cycle_failed();
        match child {
            Child::Listener => {
                self.telemetry.record_listener_restart();
                self.restart().await
            }
            Child::Worker => {
                self.cleanup_worker().await;
                self.sleep();
                Ok(())
            }
        }
    }

    /// Prefer the error value the child sent; retrieval failure becomes the
    /// reported error itself.
    fn take_child_error(&mut self, child: Child) -> Error {
        let attempt = match child {
            Child::Worker => self.worker.as_mut().map(|w| w.err_rx.try_recv()),
            Child::Listener => self.listener.as_mut().map(|l| l.err_rx.try_recv()),
        };
        match attempt {
            Some(Ok(err)) => err,
            Some(Err(recv_err)) => anyhow!(
                "retrieving the {} error failed: {recv_err}",
                child.as_str()
            ),
            None => anyhow!("{} error signalled but no {} is live", child.as_str(), child.as_str()),
        }
    }

    fn report(&self, stats: &CycleStats) {
        for (key, value) in stats.entries() {
            tracing::info!(key, value, "cycle statistic");
            self.sink.status_set(key, &value.to_string());
        }
    }

    /// Closes the worker's channel endpoints and terminates the task if it
    /// is still alive. Safe to call with no worker.
    async fn cleanup_worker(&mut self) {
        self.set_status(AgentStatus::Cleanup);
        self.pending.worker_data = None;
        self.pending.worker_err = None;
        if let Some(worker) = self.worker.take() {
            tracing::info!("cleaning up worker");
            let WorkerHandle {
                data_rx,
                err_rx,
                mut child,
            } = worker;
            drop(data_rx);
            drop(err_rx);
            child.terminate().await;
        }
    }

    /// Listener counterpart of [`Self::cleanup_worker`].
    async fn cleanup_listener(&mut self) {
        self.set_status(AgentStatus::Cleanup);
        self.pending.listener_err = None;
        if let Some(listener) = self.listener.take() {
            tracing::info!("cleaning up listener");
            let ListenerHandle {
                data_tx,
                err_rx,
                mut child,
                ..
            } = listener;
            drop(data_tx);
            drop(err_rx);
            child.terminate().await;
        }
    }

    /// Arms the one-shot refresh timer; the timer firing is the only path
    /// back to `run`.
    fn sleep(&mut self) {
        self.set_status(AgentStatus::Sleeping);
        let interval = self.config.refresh_interval();
        self.deadline = Some(Instant::now() + Duration::from_secs(interval));
        tracing::info!(seconds = interval, "sleeping until next refresh");
    }

    /// Graceful teardown of both children. Terminal.
    pub async fn shutdown(&mut self) {
        tracing::info!("shutting down");
        self.cleanup_worker().await;
        self.cleanup_listener().await;
        self.deadline = None;
        self.set_status(AgentStatus::Shutdown);
        self.sink.shutdown_complete();
    }

    /// Full restart: tear down both children and run the init sequence
    /// again, so the policy surface never outlives its supervisor.
    async fn restart(&mut self) -> Result<()> {
        tracing::info!("restarting");
        self.set_status(AgentStatus::Restarting);
        self.cleanup_worker().await;
        self.cleanup_listener().await;
        Box::pin(self.start()).await
    }

    // --- state publication ----------------------------------------------

    fn set_status(&mut self, status: AgentStatus) {
        self.state.status = status;
        state::publish(self.sink.as_ref(), &self.state);
        tracing::info!(status = status.as_str(), "status");
    }

    fn set_result(&mut self, result: CycleResult) {
        self.state.result = Some(result);
        state::publish(self.sink.as_ref(), &self.state);
        tracing::info!(result = result.as_str(), "result");
    }

    fn mark_last_start(&mut self) {
        self.state.last_start = Some(Utc::now());
        state::publish(self.sink.as_ref(), &self.state);
    }

    fn mark_last_end(&mut self) {
        self.state.last_end = Some(Utc::now());
        state::publish(self.sink.as_ref(), &self.state);
    }
}

async fn recv_opt<T>(rx: Option<&mut mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
