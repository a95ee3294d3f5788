//! One-shot retrieval of the validated ROA feed.
//!
//! The cache is an external validator exposing its current VRP set as a JSON
//! object with a `roas` array. One fetch is one `GET` with an
//! `Accept: application/json` header; there is no retry or timeout here —
//! a stuck fetch is resolved by the supervisor terminating the worker.

use std::fmt;

use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::vrp::{Vrp, VrpSet};

/// Errors surfaced by a fetch cycle. All of them fail the cycle as a whole;
/// no partial data is ever produced.
#[derive(Debug)]
pub enum FetchError {
    /// Transport-level failure: connect, send, or body read.
    Transport(reqwest::Error),
    /// The cache answered with a non-success status.
    Status(StatusCode),
    /// The response body was not the expected JSON document.
    Json(serde_json::Error),
    /// A `roas` element did not convert to a VRP.
    Record {
        index: usize,
        source: anyhow::Error,
    },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(err) => write!(f, "cache transport error: {err}"),
            FetchError::Status(status) => write!(f, "cache answered with status {status}"),
            FetchError::Json(err) => write!(f, "cache payload is not valid JSON: {err}"),
            FetchError::Record { index, source } => {
                write!(f, "roas[{index}] is not a valid VRP: {source:#}")
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Transport(err) => Some(err),
            FetchError::Status(_) => None,
            FetchError::Json(err) => Some(err),
            FetchError::Record { source, .. } => Some(source.as_ref()),
        }
    }
}

/// Wire form of one `roas` element.
#[derive(Debug, Clone, Deserialize)]
pub struct RoaRecord {
    pub asn: String,
    pub prefix: String,
    #[serde(rename = "maxLength")]
    pub max_length: u8,
    pub ta: String,
}

#[derive(Debug, Deserialize)]
struct CachePayload {
    roas: Vec<RoaRecord>,
}

/// HTTP client bound to no particular cache; the URL is supplied per fetch.
#[derive(Debug, Clone)]
pub struct CacheClient {
    http: reqwest::Client,
}

impl CacheClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build the cache HTTP client")?;
        Ok(Self { http })
    }

    /// Performs one fetch and parses the payload into a [`VrpSet`].
    pub async fn fetch(&self, url: &str) -> Result<VrpSet, FetchError> {
        tracing::info!(url, "getting VRP set from cache");
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await.map_err(FetchError::Transport)?;
        let payload: CachePayload =
            serde_json::from_slice(&body).map_err(FetchError::Json)?;

        let mut vrps = Vec::with_capacity(payload.roas.len());
        for (index, record) in payload.roas.into_iter().enumerate() {
            let vrp = Vrp::new(&record.asn, &record.prefix, record.max_length, record.ta)
                .map_err(|source| FetchError::Record { index, source })?;
            vrps.push(vrp);
        }
        tracing::info!(records = vrps.len(), "fetched VRP records");
        Ok(VrpSet::new(vrps))
    }
}
