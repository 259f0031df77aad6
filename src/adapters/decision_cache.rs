//! Authorizer result cache.
//!
//! Decisions are keyed by (credential digest, method ARN) and live for the
//! authorizer TTL. Raw credentials are never stored.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use scc::{HashMap, hash_map::Entry};
use tokio::{sync::broadcast, time::MissedTickBehavior};

use crate::{
    adapters::digest_store::hash_credential, core::authorizer::PolicyDecision,
    utils::ShutdownReason,
};

#[derive(Debug, Clone)]
struct CachedDecision {
    decision: PolicyDecision,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct DecisionCache {
    entries: Arc<HashMap<(String, String), CachedDecision>>,
    ttl: Duration,
}

impl DecisionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A zero TTL disables caching.
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Cached decision for `credential` on `method_arn`, if still fresh.
    pub async fn get(&self, credential: &str, method_arn: &str) -> Option<PolicyDecision> {
        if !self.is_enabled() {
            return None;
        }
        let key = (hash_credential(credential), method_arn.to_string());
        let now = Instant::now();
        let cached = self
            .entries
            .read_async(&key, |_, entry| entry.clone())
            .await?;
        if cached.expires_at > now {
            Some(cached.decision)
        } else {
            let _ = self.entries.remove_async(&key).await;
            None
        }
    }

    pub async fn insert(&self, credential: &str, method_arn: &str, decision: PolicyDecision) {
        if !self.is_enabled() {
            return;
        }
        let key = (hash_credential(credential), method_arn.to_string());
        let value = CachedDecision {
            decision,
            expires_at: Instant::now() + self.ttl,
        };
        match self.entries.entry_async(key).await {
            Entry::Occupied(mut occupied) => *occupied.get_mut() = value,
            Entry::Vacant(vacant) => {
                vacant.insert_entry(value);
            }
        }
    }

    /// Drop expired entries, returning how many remain.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.entries
            .retain_async(|_, entry| entry.expires_at > now)
            .await;
        self.entries.len()
    }

    /// Purge expired entries once per TTL until `shutdown` fires.
    pub async fn run_purge_loop(self, mut shutdown: broadcast::Receiver<ShutdownReason>) {
        if !self.is_enabled() {
            return;
        }
        let mut ticker = tokio::time::interval(self.ttl);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let remaining = self.purge_expired().await;
                    tracing::debug!(remaining, "Authorizer cache purged");
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Authorizer cache purge loop stopped");
                    break;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
