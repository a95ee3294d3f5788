use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// In-memory stand-in for an RPKI validation cache's export endpoint.
#[derive(Clone)]
pub struct MockCache {
    roas: Arc<RwLock<Vec<Value>>>,
    failing: Arc<AtomicBool>,
    requests: Arc<AtomicU64>,
}

impl MockCache {
    pub fn new(roas: Vec<Value>) -> Self {
        Self {
            roas: Arc::new(RwLock::new(roas)),
            failing: Arc::new(AtomicBool::new(false)),
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn roa(asn: &str, prefix: &str, max_length: u8) -> Value {
        json!({
            "asn": asn,
            "prefix": prefix,
            "maxLength": max_length,
            "ta": "mock",
        })
    }

    pub fn set_roas(&self, roas: Vec<Value>) {
        *self.roas.write().expect("mock cache poisoned") = roas;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    fn payload(&self) -> Value {
        let roas = self.roas.read().expect("mock cache poisoned").clone();
        json!({ "roas": roas })
    }
}

pub struct MockCacheServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockCacheServer {
    pub async fn start(cache: MockCache) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock cache listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock cache address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock cache listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock cache listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let cache = cache.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(cache.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock cache HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock cache server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}/roas", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Full URL of the JSON export endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(cache: MockCache, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    cache.requests.fetch_add(1, Ordering::SeqCst);

    if cache.failing.load(Ordering::SeqCst) {
        let mut response = Response::new(Body::from("mock cache unavailable"));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        return Ok(response);
    }

    let body = cache.payload().to_string();
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}
