//! Reachability of link targets
//!
//! New targets are queued by the creation path. The probe worker takes one
//! URL per tick, sends a `HEAD` request and stores the outcome in a shared
//! map keyed by target URL. The refresh scheduler re-queues entries that got
//! stale. Readers only ever look at the map.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError, Permit, Receiver, Sender};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::model::{Reachability, ReachabilityRecord};

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Something that can tell whether a URL answers.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Issues a lightweight existence check and returns the status code.
    async fn head(&self, url: &str) -> Result<u16, ProbeError>;
}

/// `HEAD` requests over reqwest. Redirects are not followed; a 3xx counts as reachable.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn head(&self, url: &str) -> Result<u16, ProbeError> {
        match self.client.head(url).send().await {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) if e.is_timeout() => Err(ProbeError::Timeout),
            Err(e) => Err(ProbeError::Transport(e.to_string())),
        }
    }
}

/// Client and server errors are unreachable, every other status is reachable.
pub fn is_reachable_status(status: u16) -> bool {
    !(400..600).contains(&status)
}

/// Shared reachability state: the cache, the queue and the probe client
///
/// Clones share everything. The probe worker is the only writer of the map.
#[derive(Clone)]
pub struct ReachabilityService {
    cache: Arc<DashMap<String, ReachabilityRecord>>,
    tx: Sender<String>,
    rx: Arc<Mutex<Receiver<String>>>,
    prober: Arc<dyn Prober>,
    staleness: ChronoDuration,
}

impl ReachabilityService {
    pub fn new(prober: Arc<dyn Prober>, capacity: usize, staleness: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            cache: Arc::new(DashMap::new()),
            tx,
            rx: Arc::new(Mutex::new(rx)),
            prober,
            staleness: ChronoDuration::from_std(staleness).unwrap_or(ChronoDuration::MAX),
        }
    }

    /// Waits for room in the queue and holds it until the permit sends a URL
    /// or is dropped. `None` once the queue is closed.
    pub async fn reserve(&self) -> Option<Permit<'_, String>> {
        match self.tx.reserve().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!("reachability queue closed");
                None
            }
        }
    }

    /// Queues `url` only if there is room right now.
    pub fn try_enqueue(&self, url: &str) -> bool {
        match self.tx.try_send(url.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => {
                warn!("reachability queue closed, dropping {}", url);
                false
            }
        }
    }

    /// Number of URLs waiting to be probed
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Last known reachability of `url`. Pure lookup.
    pub fn is_reachable(&self, url: &str) -> Reachability {
        match self.cache.get(url) {
            Some(record) if record.reachable => Reachability::Reachable,
            Some(_) => Reachability::Unreachable,
            None => Reachability::Unknown,
        }
    }

    pub fn record(&self, url: &str) -> Option<ReachabilityRecord> {
        self.cache.get(url).map(|r| *r)
    }

    /// Probes at most one queued URL. Returns the URL that was probed.
    pub async fn probe_next(&self) -> Option<String> {
        let url = {
            let mut rx = self.rx.lock().await;
            rx.try_recv().ok()?
        };

        let reachable = match self.prober.head(&url).await {
            Ok(status) => {
                debug!("probe {} -> {}", url, status);
                is_reachable_status(status)
            }
            Err(e) => {
                debug!("probe {} failed: {}", url, e);
                false
            }
        };

        self.cache.insert(
            url.clone(),
            ReachabilityRecord {
                reachable,
                checked_at: Utc::now(),
            },
        );
        Some(url)
    }

    /// Re-queues every entry older than the staleness threshold without
    /// blocking. Returns how many were queued; the rest wait for the next tick.
    pub fn refresh_stale(&self) -> usize {
        let now = Utc::now();
        let stale: Vec<String> = self
            .cache
            .iter()
            .filter(|entry| now - entry.value().checked_at > self.staleness)
            .map(|entry| entry.key().clone())
            .collect();

        let mut queued = 0;
        for url in &stale {
            if !self.try_enqueue(url) {
                debug!("reachability queue full, {} stale entries left for next tick", stale.len() - queued);
                break;
            }
            queued += 1;
        }
        queued
    }
}
