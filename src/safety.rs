//! Safety classification of link targets
//!
//! Creation hands `(url, hash)` to a [`SafetyDispatcher`] and moves on. An
//! oracle task turns requests into verdicts and a classifier task applies
//! them to the registry. Delivery is at most once: a request the oracle
//! cannot answer produces no verdict and the link stays `Unknown`.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use url::Url;

use crate::database::Registry;

const SAFE_BROWSING_ENDPOINT: &str = "https://safebrowsing.googleapis.com/v4/threatMatches:find";

/// A request for classification, sent once per new link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyRequest {
    pub url: String,
    pub hash: String,
}

/// The oracle's answer for one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub hash: String,
    pub safe: bool,
}

/// External source of safe/unsafe decisions.
///
/// `None` means the oracle could not decide; no verdict is delivered.
#[async_trait]
pub trait SafetyOracle: Send + Sync {
    async fn check(&self, url: &str) -> Option<bool>;
}

/// Marks every URL whose host is on the blocklist (or a subdomain of one) unsafe.
pub struct BlocklistOracle {
    hosts: Vec<String>,
}

impl BlocklistOracle {
    pub fn new(hosts: Vec<String>) -> Self {
        let hosts = hosts.into_iter().map(|h| h.trim().to_ascii_lowercase()).filter(|h| !h.is_empty()).collect();
        Self { hosts }
    }
}

#[async_trait]
impl SafetyOracle for BlocklistOracle {
    async fn check(&self, url: &str) -> Option<bool> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();

        let blocked = self
            .hosts
            .iter()
            .any(|blocked| host == *blocked || host.ends_with(&format!(".{}", blocked)));
        Some(!blocked)
    }
}

/// Google Safe Browsing v4 lookup
pub struct SafeBrowsingOracle {
    client: reqwest::Client,
    api_key: String,
}

impl SafeBrowsingOracle {
    pub fn new(api_key: String, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl SafetyOracle for SafeBrowsingOracle {
    async fn check(&self, url: &str) -> Option<bool> {
        let body = json!({
            "client": { "clientId": "urlshortener", "clientVersion": env!("CARGO_PKG_VERSION") },
            "threatInfo": {
                "threatTypes": ["MALWARE", "SOCIAL_ENGINEERING", "UNWANTED_SOFTWARE", "POTENTIALLY_HARMFUL_APPLICATION"],
                "platformTypes": ["ANY_PLATFORM"],
                "threatEntryTypes": ["URL"],
                "threatEntries": [{ "url": url }]
            }
        });

        let response = match self
            .client
            .post(SAFE_BROWSING_ENDPOINT)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Safe Browsing request for {} failed: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Safe Browsing answered {} for {}", response.status(), url);
            return None;
        }

        // An empty object means no threat matched
        match response.json::<serde_json::Value>().await {
            Ok(value) => Some(value.get("matches").and_then(|m| m.as_array()).map_or(true, |m| m.is_empty())),
            Err(e) => {
                warn!("Safe Browsing response for {} unreadable: {}", url, e);
                None
            }
        }
    }
}

/// Producer side of the classification channel, held by the creation path
#[derive(Clone)]
pub struct SafetyDispatcher {
    tx: UnboundedSender<SafetyRequest>,
}

impl SafetyDispatcher {
    pub fn new() -> (Self, UnboundedReceiver<SafetyRequest>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    /// Fire and forget. Never blocks the caller.
    pub fn dispatch(&self, url: &str, hash: &str) {
        let request = SafetyRequest {
            url: url.to_string(),
            hash: hash.to_string(),
        };
        if self.tx.send(request).is_err() {
            warn!("safety channel closed, {} stays unclassified", hash);
        }
    }
}

/// Answers requests with the oracle and forwards verdicts. Runs until the
/// dispatcher side is dropped.
pub async fn run_oracle(
    mut requests: UnboundedReceiver<SafetyRequest>,
    oracle: Arc<dyn SafetyOracle>,
    verdicts: UnboundedSender<Verdict>,
) {
    while let Some(request) = requests.recv().await {
        match oracle.check(&request.url).await {
            Some(safe) => {
                debug!("oracle: {} -> safe={}", request.url, safe);
                if verdicts.send(Verdict { hash: request.hash, safe }).is_err() {
                    break;
                }
            }
            None => debug!("oracle: no verdict for {}", request.url),
        }
    }
    info!("safety oracle stopped");
}

/// Applies verdicts to the registry
#[derive(Clone)]
pub struct SafetyClassifier {
    registry: Registry,
}

impl SafetyClassifier {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Records one verdict. Links that are gone or already classified are left alone.
    pub fn apply(&self, verdict: &Verdict) {
        let result = if verdict.safe {
            self.registry.mark_safe(&verdict.hash)
        } else {
            self.registry.mark_unsafe(&verdict.hash)
        };

        match result {
            Ok(true) => info!("link {} classified safe={}", verdict.hash, verdict.safe),
            Ok(false) => debug!("verdict for {} ignored", verdict.hash),
            Err(e) => warn!("failed to record verdict for {}: {}", verdict.hash, e),
        }
    }

    pub async fn run(self, mut verdicts: UnboundedReceiver<Verdict>) {
        while let Some(verdict) = verdicts.recv().await {
            self.apply(&verdict);
        }
        info!("safety classifier stopped");
    }
}
