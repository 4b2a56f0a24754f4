//! Background task scheduling
//!
//! Each periodic task is a loop that runs once and then sleeps for a fixed
//! delay, so the next run starts only after the previous one finished.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::safety::{run_oracle, SafetyClassifier, SafetyOracle, SafetyRequest};
use crate::state::AppState;

/// Spawns `task` in a fixed-delay loop. The task never overlaps with itself.
pub fn spawn_fixed_delay<F, Fut>(name: &'static str, delay: Duration, mut task: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!("{} started, delay {:?}", name, delay);
        loop {
            task().await;
            sleep(delay).await;
        }
    })
}

/// Starts every background task and returns their handles.
pub fn start_background_tasks(
    state: &AppState,
    requests: UnboundedReceiver<SafetyRequest>,
    oracle: Arc<dyn SafetyOracle>,
) -> Vec<JoinHandle<()>> {
    let config = &state.config;
    let mut handles = Vec::new();

    let reachability = state.reachability.clone();
    handles.push(spawn_fixed_delay("probe worker", config.worker_delay, move || {
        let reachability = reachability.clone();
        async move {
            reachability.probe_next().await;
        }
    }));

    let reachability = state.reachability.clone();
    handles.push(spawn_fixed_delay("refresh scheduler", config.refresh_delay, move || {
        let reachability = reachability.clone();
        async move {
            reachability.refresh_stale();
        }
    }));

    let qr = state.qr.clone();
    handles.push(spawn_fixed_delay("QR worker", config.worker_delay, move || {
        let qr = qr.clone();
        async move {
            qr.generate_next().await;
        }
    }));

    let ranking = state.ranking.clone();
    handles.push(spawn_fixed_delay("ranking aggregator", config.worker_delay, move || {
        let ranking = ranking.clone();
        async move {
            if let Err(e) = ranking.recompute() {
                warn!("ranking recomputation failed: {}", e);
            }
        }
    }));

    let (verdict_tx, verdict_rx) = unbounded_channel();
    handles.push(tokio::spawn(run_oracle(requests, oracle, verdict_tx)));
    handles.push(tokio::spawn(SafetyClassifier::new(state.registry.clone()).run(verdict_rx)));

    handles
}
