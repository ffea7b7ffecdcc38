// Rate limiting - per-client windows, session counters, concurrency ceiling
//
// All tracking state is memory-only and lives behind this interface; the
// clock is injected so the trailing-window rules are testable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::errors::RateLimitRule;
use super::models::Limits;

/// Trailing window for the per-client cap
const CLIENT_WINDOW: Duration = Duration::from_secs(3600);
/// Entries idle longer than this are swept
const RETENTION: Duration = Duration::from_secs(2 * 3600);

/// Time source. Injected for testability.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock-backed default
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Default)]
struct TrackingState {
    /// Per-client request timestamps within the trailing window
    client_windows: HashMap<String, Vec<Instant>>,
    /// Monotonically increasing per-session download counts
    session_counts: HashMap<String, usize>,
    /// Last fetch time per session, for the spacing rule
    last_fetch: HashMap<String, Instant>,
}

pub struct RateLimiter {
    limits: Limits,
    clock: Arc<dyn Clock>,
    state: Mutex<TrackingState>,
    /// Shared with the fetch pipeline, which decrements it on completion
    active: Arc<AtomicUsize>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    pub fn with_clock(limits: Limits, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            clock,
            state: Mutex::new(TrackingState::default()),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The global active-fetch counter, shared with pipeline guards
    pub fn active_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active)
    }

    /// Check every rule in priority order; the first violation wins.
    pub fn check(&self, client_id: &str, session_id: &str) -> Result<(), RateLimitRule> {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("rate limiter state poisoned");

        // 1. Session lifetime cap
        let session_count = state.session_counts.get(session_id).copied().unwrap_or(0);
        if session_count >= self.limits.max_downloads_per_session {
            return Err(RateLimitRule::SessionCap {
                limit: self.limits.max_downloads_per_session,
            });
        }

        // 2. Per-client trailing-hour cap; stale timestamps are pruned here
        if let Some(window) = state.client_windows.get_mut(client_id) {
            window.retain(|t| now.duration_since(*t) < CLIENT_WINDOW);
            if window.len() >= self.limits.max_downloads_per_client_hour {
                return Err(RateLimitRule::ClientHourly {
                    limit: self.limits.max_downloads_per_client_hour,
                });
            }
        }

        // 3. Minimum spacing within the session
        if let Some(last) = state.last_fetch.get(session_id) {
            let elapsed = now.duration_since(*last).as_secs();
            if elapsed < self.limits.min_secs_between_fetches {
                return Err(RateLimitRule::MinInterval {
                    remaining_secs: self.limits.min_secs_between_fetches - elapsed,
                });
            }
        }

        // 4. Global concurrency ceiling; excess is denied, never queued
        if self.active.load(Ordering::SeqCst) >= self.limits.max_concurrent_fetches {
            return Err(RateLimitRule::ConcurrencyCeiling {
                limit: self.limits.max_concurrent_fetches,
            });
        }

        Ok(())
    }

    /// Commit a request that `check` allowed. Appends the timestamp to the
    /// client window, bumps the session counter, stamps the last-fetch time
    /// and takes one concurrency slot.
    pub fn record(&self, client_id: &str, session_id: &str) {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("rate limiter state poisoned");

        state
            .client_windows
            .entry(client_id.to_string())
            .or_default()
            .push(now);
        *state.session_counts.entry(session_id.to_string()).or_insert(0) += 1;
        state.last_fetch.insert(session_id.to_string(), now);

        self.active.fetch_add(1, Ordering::SeqCst);
    }

    /// Discard tracking entries whose most recent activity is older than
    /// the retention horizon. Bounds memory on long-lived processes.
    pub fn sweep(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("rate limiter state poisoned");

        state.client_windows.retain(|_, window| {
            window.retain(|t| now.duration_since(*t) < RETENTION);
            !window.is_empty()
        });

        state
            .last_fetch
            .retain(|_, last| now.duration_since(*last) < RETENTION);

        // Session counters follow their last-fetch stamps
        let live_sessions: Vec<String> = state.last_fetch.keys().cloned().collect();
        state
            .session_counts
            .retain(|session, _| live_sessions.contains(session));
    }
}
