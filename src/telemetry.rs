//! Tracing setup and lightweight runtime counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls
/// back to `info`. Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters for the agent's refresh machinery.
#[derive(Default, Debug)]
pub struct Telemetry {
    cycles_ok: AtomicU64,
    cycles_failed: AtomicU64,
    listener_restarts: AtomicU64,
}

impl Telemetry {
    pub fn record_cycle_ok(&self) {
        self.cycles_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listener_restart(&self) {
        self.listener_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles_ok(&self) -> u64 {
        self.cycles_ok.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }

    pub fn listener_restarts(&self) -> u64 {
        self.listener_restarts.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cycles_ok: self.cycles_ok(),
            cycles_failed: self.cycles_failed(),
            listener_restarts: self.listener_restarts(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub listener_restarts: u64,
}
