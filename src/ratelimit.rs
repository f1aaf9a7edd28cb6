use crate::config::RateLimitConfig;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Rejected { retry_after_secs: u64 },
}

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    count: u32,
    window_end: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: DashMap<String, ClientWindow>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: DashMap::new(),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_millis(config.window_ms))
    }

    pub fn check(&self, identity: &str) -> RateLimitDecision {
        self.admit(identity, Instant::now())
    }

    pub fn admit(&self, identity: &str, now: Instant) -> RateLimitDecision {
        let mut entry = self
            .clients
            .entry(identity.to_string())
            .or_insert(ClientWindow {
                count: 0,
                window_end: now + self.window,
            });

        if now > entry.window_end {
            entry.count = 0;
            entry.window_end = now + self.window;
        }

        // Saturates instead of wrapping; anything above the limit rejects.
        entry.count = entry.count.saturating_add(1);

        if entry.count > self.max_requests {
            return RateLimitDecision::Rejected {
                retry_after_secs: retry_after_seconds(entry.window_end, now),
            };
        }

        RateLimitDecision::Allowed
    }

    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, window| now <= window.window_end);
        before.saturating_sub(self.clients.len())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = limiter.evict_expired(Instant::now());
                if evicted > 0 {
                    tracing::debug!(
                        evicted,
                        remaining = limiter.len(),
                        "rate limiter: evicted expired client windows"
                    );
                }
            }
        })
    }
}

fn retry_after_seconds(window_end: Instant, now: Instant) -> u64 {
    let remaining = window_end.saturating_duration_since(now);
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}
