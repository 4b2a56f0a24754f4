//! Click rankings
//!
//! Every tick recomputes both rankings from the full click log and swaps
//! the published snapshot in one step. Readers always see a complete
//! snapshot from some earlier tick.

use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;

use crate::database::Registry;
use crate::error::Result;
use crate::model::{UrlSum, UserSum};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RankingSnapshot {
    pub links: Vec<UrlSum>,
    pub users: Vec<UserSum>,
}

/// Stable sort, highest count first. Equal counts keep their input order.
fn sort_by_count(counts: &mut [(String, u64)]) {
    counts.sort_by(|a, b| b.1.cmp(&a.1));
}

#[derive(Clone)]
pub struct RankingService {
    registry: Registry,
    snapshot: Arc<ArcSwap<RankingSnapshot>>,
}

impl RankingService {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            snapshot: Arc::new(ArcSwap::from_pointee(RankingSnapshot::default())),
        }
    }

    /// Rebuilds both rankings and publishes them.
    pub fn recompute(&self) -> Result<()> {
        let mut links = Vec::new();
        for (hash, count) in self.registry.click_counts_by_hash()? {
            if self.registry.find_by_key(&hash)?.is_some() {
                links.push((hash, count));
            }
        }
        sort_by_count(&mut links);

        let mut users = self.registry.click_counts_by_ip()?;
        sort_by_count(&mut users);

        let snapshot = RankingSnapshot {
            links: links.into_iter().map(|(hash, sum)| UrlSum { hash, sum }).collect(),
            users: users.into_iter().map(|(ip, sum)| UserSum { ip, sum }).collect(),
        };
        debug!(
            "ranking recomputed: {} links, {} users",
            snapshot.links.len(),
            snapshot.users.len()
        );
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    /// Links by click count, from the latest snapshot
    pub fn ranking(&self) -> Vec<UrlSum> {
        self.snapshot.load().links.clone()
    }

    /// Submitters by click count, from the latest snapshot
    pub fn users(&self) -> Vec<UserSum> {
        self.snapshot.load().users.clone()
    }
}
