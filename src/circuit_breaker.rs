//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for download operations.
//! When yt-dlp keeps failing (broken install, upstream block, network outage) new
//! requests fail fast instead of each one burning through its retries.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::download_config::RecoveryConfig;

/// Circuit breaker for download operations
///
/// ```text
/// CLOSED ────failures ≥ threshold────► OPEN
///    ▲                                   │
///    └──────────reset timeout────────────┘
/// ```
///
/// - **CLOSED → OPEN**: when the consecutive failure count reaches
///   `circuit_breaker_threshold`
/// - **OPEN → CLOSED**: once `circuit_breaker_reset_secs` have elapsed since the last
///   failure; the next request tests whether the service recovered
/// - Any success resets the failure count
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: RecoveryConfig,
}

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// ```rust
    /// use media_relay_bot::download_config::RecoveryConfig;
    /// use media_relay_bot::circuit_breaker::CircuitBreaker;
    ///
    /// let circuit_breaker = CircuitBreaker::new(RecoveryConfig::default());
    /// assert!(!circuit_breaker.is_open());
    /// ```
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    /// Check if circuit breaker is open (blocking requests)
    ///
    /// Returns `true` when the failure count is at or above the threshold and the reset
    /// timeout has not elapsed yet. Once it has elapsed the counters are cleared and the
    /// breaker reports closed.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();

        if state.failure_count < self.config.circuit_breaker_threshold {
            return false;
        }

        match state.last_failure_time {
            Some(last_time)
                if last_time.elapsed()
                    < Duration::from_secs(self.config.circuit_breaker_reset_secs) =>
            {
                true
            }
            _ => {
                *state = BreakerState::default();
                false
            }
        }
    }

    /// Record a failed download
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
    }

    /// Record a successful download, closing the breaker
    pub fn record_success(&self) {
        *self.state.lock() = BreakerState::default();
    }

    /// Current number of consecutive failures
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }
}
