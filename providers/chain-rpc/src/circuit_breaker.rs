//! Per-endpoint circuit breaker
//!
//! - Closed: requests flow, consecutive failures are counted
//! - Open: requests are refused until the cool-down elapses
//! - HalfOpen: probe requests flow; enough successes close the circuit,
//!   one failure re-opens it

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Successful probes needed to close it again
    pub success_threshold: u32,
    /// Time spent open before probing
    pub cool_down: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cool_down: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    probes_ok: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    endpoint: String,
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                probes_ok: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a request may be sent now; moves Open to HalfOpen after the cool-down
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.cool_down)
                    .unwrap_or(true);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    inner.probes_ok = 0;
                    info!("Circuit for {} is half-open", self.endpoint);
                }
                cooled
            }
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.probes_ok += 1;
            if inner.probes_ok >= self.config.success_threshold {
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                info!("Circuit for {} closed after recovery", self.endpoint);
            }
        }
    }

    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failures += 1;
        let trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(
                "Circuit for {} opened after {} failures",
                self.endpoint, inner.failures
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, cool_down: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "http://node",
            BreakerConfig {
                failure_threshold,
                success_threshold: 2,
                cool_down,
            },
        )
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let cb = breaker(3, Duration::from_secs(60));
        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = breaker(2, Duration::from_secs(60));
        cb.on_failure();
        cb.on_success();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_recovery_and_relapse() {
        let cb = breaker(1, Duration::ZERO);
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(cb.allow());
        cb.on_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.on_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
