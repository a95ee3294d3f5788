//! One-shot fetch worker.
//!
//! A fresh worker is spawned per refresh cycle; it performs exactly one
//! fetch, computes the cycle statistics, and reports `(stats, set)` on its
//! data channel or an error on its error channel — never both, never partial
//! data. Both channel endpoints close when the task exits, so the supervisor
//! wakes exactly once per invocation. Cancellation is a clean, non-error
//! exit.

use std::collections::BTreeSet;

use anyhow::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::fetch::CacheClient;
use crate::task::ChildTask;
use crate::vrp::{Afi, VrpSet};

/// Per-cycle summary statistics, reported to the host status surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub covered_prefixes_ipv4: usize,
    pub covered_prefixes_ipv6: usize,
    pub origin_asns_ipv4: usize,
    pub origin_asns_ipv6: usize,
    /// Distinct origins across both families.
    pub origin_asns_total: usize,
}

impl CycleStats {
    pub fn compute(vrps: &VrpSet) -> Self {
        let origins_v4 = vrps.origins(Afi::Ipv4);
        let origins_v6 = vrps.origins(Afi::Ipv6);
        let total: BTreeSet<_> = origins_v4.union(&origins_v6).collect();
        Self {
            covered_prefixes_ipv4: vrps.covered(Afi::Ipv4).len(),
            covered_prefixes_ipv6: vrps.covered(Afi::Ipv6).len(),
            origin_asns_ipv4: origins_v4.len(),
            origin_asns_ipv6: origins_v6.len(),
            origin_asns_total: total.len(),
        }
    }

    /// Named key/value pairs in reporting order.
    pub fn entries(&self) -> [(&'static str, usize); 5] {
        [
            ("covered_prefixes_ipv4", self.covered_prefixes_ipv4),
            ("covered_prefixes_ipv6", self.covered_prefixes_ipv6),
            ("origin_asns_ipv4", self.origin_asns_ipv4),
            ("origin_asns_ipv6", self.origin_asns_ipv6),
            ("origin_asns_total", self.origin_asns_total),
        ]
    }
}

/// The worker's single success message.
pub type WorkerReport = (CycleStats, VrpSet);

/// Supervisor-side handle: the worker's outbound channel endpoints plus its
/// task handle.
pub struct WorkerHandle {
    pub(crate) data_rx: mpsc::Receiver<WorkerReport>,
    pub(crate) err_rx: mpsc::Receiver<Error>,
    pub(crate) child: ChildTask,
}

impl WorkerHandle {
    /// Spawns a worker bound to `cache_url`.
    pub fn spawn(client: CacheClient, cache_url: String) -> Self {
        let (data_tx, data_rx) = mpsc::channel(1);
        let (err_tx, err_rx) = mpsc::channel(1);
        let child = ChildTask::spawn("worker", move |cancel| {
            run_worker(client, cache_url, data_tx, err_tx, cancel)
        });
        Self {
            data_rx,
            err_rx,
            child,
        }
    }
}

async fn run_worker(
    client: CacheClient,
    cache_url: String,
    data_tx: mpsc::Sender<WorkerReport>,
    err_tx: mpsc::Sender<Error>,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("worker got termination signal: exiting");
        }
        result = fetch_cycle(&client, &cache_url) => match result {
            Ok(report) => {
                let _ = data_tx.send(report).await;
            }
            Err(err) => {
                tracing::error!(error = %err, "fetch cycle failed");
                let _ = err_tx.send(err).await;
            }
        }
    }
    // data_tx and err_tx drop here, closing both outbound endpoints
}

async fn fetch_cycle(client: &CacheClient, cache_url: &str) -> Result<WorkerReport, Error> {
    let vrps = client.fetch(cache_url).await?;
    let stats = CycleStats::compute(&vrps);
    Ok((stats, vrps))
}
