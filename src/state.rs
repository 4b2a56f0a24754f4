//! Application state shared by request handlers and background workers

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Config;
use crate::database::Registry;
use crate::qr::{QrEncoder, QrService};
use crate::ranking::RankingService;
use crate::reachability::{Prober, ReachabilityService};
use crate::safety::{SafetyDispatcher, SafetyRequest};

/// Everything a handler needs. Every field is a cheap handle, so the state
/// clones freely across Axum handlers and spawned tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Registry,
    pub reachability: ReachabilityService,
    pub qr: QrService,
    pub ranking: RankingService,
    pub safety: SafetyDispatcher,
}

impl AppState {
    /// Wires the services together. The returned receiver carries safety
    /// requests and must be handed to the oracle task (or kept alive by tests).
    pub fn new(
        config: Config,
        registry: Registry,
        prober: Arc<dyn Prober>,
        encoder: Arc<dyn QrEncoder>,
    ) -> (Self, UnboundedReceiver<SafetyRequest>) {
        let (safety, requests) = SafetyDispatcher::new();
        let reachability = ReachabilityService::new(prober, config.queue_capacity, config.staleness);
        let qr = QrService::new(registry.clone(), encoder, config.queue_capacity);
        let ranking = RankingService::new(registry.clone());

        let state = Self {
            config: Arc::new(config),
            registry,
            reachability,
            qr,
            ranking,
            safety,
        };
        (state, requests)
    }

    /// Public short URL of `hash`
    pub fn short_url(&self, hash: &str) -> String {
        format!("{}/{}", self.config.public_base_url, hash)
    }
}
