use crate::config::PacingConfig;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Consecutive successes needed before the delay is shortened
const SUCCESS_STREAK_TO_SPEED_UP: u32 = 3;

/// Backoff exponent cap (2^4 = 16x base)
const MAX_BACKOFF_EXPONENT: u32 = 4;

/// Adaptive request pacing for a single crawl worker
///
/// Holds the last request instant and the current delay. Speeds up slowly
/// (three good requests shave 10%) and backs off fast (one error doubles
/// from base, up to 16x base and never beyond `max`).
#[derive(Debug, Clone)]
pub struct Pacer {
    base: Duration,
    min: Duration,
    max: Duration,

    /// Delay enforced between the previous request and the next one
    current: Duration,

    /// Timestamp of the last request, None before the first
    last_request_time: Option<Instant>,

    success_streak: u32,
    error_streak: u32,
}

impl Pacer {
    /// Creates a pacer from configuration
    pub fn new(config: &PacingConfig) -> Self {
        Self::with_bounds(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Creates a pacer from explicit bounds; the starting delay is `base`
    /// clamped into `[min, max]`
    pub fn with_bounds(base: Duration, min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            base,
            min,
            max,
            current: base.clamp(min, max),
            last_request_time: None,
            success_streak: 0,
            error_streak: 0,
        }
    }

    /// The delay currently enforced between requests
    pub fn current_delay(&self) -> Duration {
        self.current
    }

    pub fn error_streak(&self) -> u32 {
        self.error_streak
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.current {
            Some(self.current - elapsed)
        } else {
            None
        }
    }

    /// Stamps `now` as the last request time
    pub fn record_request(&mut self, now: Instant) {
        self.last_request_time = Some(now);
    }

    /// Waits until the current delay has elapsed since the last request, then
    /// stamps the request time
    ///
    /// Returns false without stamping if `cancel` fires while waiting.
    pub async fn wait_for_next(&mut self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        if let Some(wait) = self.time_until_next_request(Instant::now()) {
            tracing::trace!("Pacing: waiting {:?} before next request", wait);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return false,
            }
        }

        self.record_request(Instant::now());
        true
    }

    /// Records a successful request
    pub fn on_success(&mut self) {
        self.error_streak = 0;
        self.success_streak += 1;

        if self.success_streak >= SUCCESS_STREAK_TO_SPEED_UP {
            // 0.9x, in integer nanoseconds
            self.current = (self.current * 9 / 10).max(self.min);
            self.success_streak = 0;
            tracing::debug!("Pacing: speeding up to {:?}", self.current);
        }
    }

    /// Records a failed request and backs off
    pub fn on_error(&mut self) {
        self.success_streak = 0;
        self.error_streak = self.error_streak.saturating_add(1);

        let exponent = self.error_streak.min(MAX_BACKOFF_EXPONENT);
        let backoff = self.base.saturating_mul(1u32 << exponent);
        self.current = backoff.min(self.max);

        tracing::debug!(
            "Pacing: backing off to {:?} after {} consecutive errors",
            self.current,
            self.error_streak
        );
    }

    /// Raises the lower bound, e.g. to honor a robots.txt crawl delay
    ///
    /// The floor never exceeds `max`; base and current delay are lifted to it.
    pub fn raise_floor(&mut self, floor: Duration) {
        let floor = floor.min(self.max);
        if floor <= self.min {
            return;
        }
        self.min = floor;
        self.base = self.base.max(floor);
        self.current = self.current.max(floor);
    }
}
