//! The policy listener: an embedded HTTP server owning the served view.
//!
//! The listener runs for the agent's whole lifetime unless the supervisor
//! restarts it. It answers purely from the current [`PolicyView`]; it never
//! performs network I/O of its own. New VRP sets arrive on the inbound data
//! channel and each delivery rebuilds the view in full before any request is
//! answered against it. Internal failures never leak into response bodies;
//! clients only ever see 404 for unknown resource keys.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Error, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use super::view::PolicyView;
use crate::task::ChildTask;
use crate::vrp::{Afi, Asn, VrpSet};

/// Bounded wait for the first snapshot when a request races agent startup.
const PRIME_POLL_ATTEMPTS: u32 = 3;
const PRIME_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Supervisor-side handle: the listener's channel endpoints, bound address,
/// and task handle.
pub struct ListenerHandle {
    pub(crate) data_tx: mpsc::Sender<VrpSet>,
    pub(crate) err_rx: mpsc::Receiver<Error>,
    pub(crate) child: ChildTask,
    pub(crate) addr: SocketAddr,
}

impl ListenerHandle {
    /// The address the server actually bound (relevant with port 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Binds `listen` and spawns the listener task. Bind errors surface here so
/// the supervisor sees a failed spawn rather than a dead child.
pub async fn spawn(listen: SocketAddr) -> Result<ListenerHandle> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind policy listener on {listen}"))?;
    let addr = listener
        .local_addr()
        .context("failed to read policy listener address")?;
    let std_listener = listener
        .into_std()
        .context("failed to convert policy listener socket")?;
    std_listener
        .set_nonblocking(true)
        .context("failed to set policy listener non-blocking")?;

    let (data_tx, data_rx) = mpsc::channel(4);
    let (err_tx, err_rx) = mpsc::channel(1);
    let child = ChildTask::spawn("listener", move |cancel| {
        run_listener(std_listener, data_rx, err_tx, cancel)
    });
    tracing::info!(%addr, "policy listener serving");

    Ok(ListenerHandle {
        data_tx,
        err_rx,
        child,
        addr,
    })
}

struct ListenerShared {
    view: RwLock<PolicyView>,
    primed: AtomicBool,
}

impl ListenerShared {
    fn new() -> Self {
        Self {
            view: RwLock::new(PolicyView::empty()),
            primed: AtomicBool::new(false),
        }
    }

    async fn install(&self, vrps: VrpSet) {
        tracing::info!(vrps = vrps.len(), "got new VRP set: rebuilding policy view");
        let view = PolicyView::build(&vrps);
        *self.view.write().await = view;
        self.primed.store(true, Ordering::Release);
    }

    /// Tolerates the race between "request arrives" and "first delivery is
    /// in flight": polls a few times before settling for the empty view.
    async fn wait_until_primed(&self) {
        if self.primed.load(Ordering::Acquire) {
            return;
        }
        for _ in 0..PRIME_POLL_ATTEMPTS {
            sleep(PRIME_POLL_INTERVAL).await;
            if self.primed.load(Ordering::Acquire) {
                return;
            }
        }
        tracing::warn!("no VRP data delivered yet: serving the empty view");
    }
}

async fn run_listener(
    listener: std::net::TcpListener,
    data_rx: mpsc::Receiver<VrpSet>,
    err_tx: mpsc::Sender<Error>,
    cancel: CancellationToken,
) {
    let shared = Arc::new(ListenerShared::new());

    let service_shared = shared.clone();
    let make_service = make_service_fn(move |_| {
        let shared = service_shared.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle_request(shared.clone(), req)))
        }
    });

    let server = match Server::from_tcp(listener) {
        Ok(builder) => builder.serve(make_service),
        Err(err) => {
            let _ = err_tx
                .send(Error::new(err).context("failed to start the policy HTTP server"))
                .await;
            return;
        }
    };

    let shutdown = cancel.clone();
    let graceful = server.with_graceful_shutdown(async move {
        shutdown.cancelled().await;
    });

    tokio::select! {
        result = graceful => {
            if let Err(err) = result {
                tracing::error!(error = %err, "policy HTTP server failed");
                let _ = err_tx
                    .send(Error::new(err).context("policy HTTP server failed"))
                    .await;
            } else {
                tracing::info!("listener got termination signal: exiting");
            }
        }
        _ = intake_loop(data_rx, shared, cancel.clone()) => {}
    }
    // err_tx and the data receiver drop here, closing the channel endpoints
}

/// Drains deliveries from the supervisor. Deliveries are totally ordered;
/// each one fully supersedes the view built from its predecessor.
async fn intake_loop(
    mut data_rx: mpsc::Receiver<VrpSet>,
    shared: Arc<ListenerShared>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            delivery = data_rx.recv() => match delivery {
                Some(vrps) => shared.install(vrps).await,
                // sender gone mid-restart: keep serving the last view
                None => cancel.cancelled().await,
            }
        }
    }
}

async fn handle_request(
    shared: Arc<ListenerShared>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        return Ok(plain(StatusCode::METHOD_NOT_ALLOWED, String::new()));
    }

    shared.wait_until_primed().await;

    let path = req.uri().path().trim_matches('/').to_string();
    let segments: Vec<&str> = path.split('/').collect();
    let view = shared.view.read().await;

    let response = match segments.as_slice() {
        ["prefix-lists", afi, "covered"] => match afi.parse::<Afi>() {
            Ok(afi) => plain(StatusCode::OK, view.covered_body(afi).to_string()),
            Err(_) => not_found(),
        },
        ["prefix-lists", afi, "origin", origin] => {
            match (afi.parse::<Afi>(), parse_origin(origin)) {
                (Ok(afi), Some(origin)) => match view.origin_body(afi, origin) {
                    Some(body) => plain(StatusCode::OK, body.to_string()),
                    None => not_found(),
                },
                _ => not_found(),
            }
        }
        ["as-paths", origin] => match parse_origin(origin).and_then(|o| view.as_path_body(o)) {
            Some(body) => plain(StatusCode::OK, body),
            None => not_found(),
        },
        _ => not_found(),
    };
    Ok(response)
}

fn parse_origin(origin: &str) -> Option<Asn> {
    origin.parse::<u32>().ok().map(Asn::new)
}

fn plain(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn not_found() -> Response<Body> {
    plain(StatusCode::NOT_FOUND, "not found\n".to_string())
}
