use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Time-based pause switch for background workers.
///
/// A worker checks `is_open()` before each iteration and skips work while it is open. `trip`
/// opens it for a fixed duration; it closes by itself once the duration has passed.
#[derive(Default)]
pub struct PauseBreaker {
    state: parking_lot::Mutex<State>,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Closed,
    Open {
        until: Instant,
    },
}

impl PauseBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        let now = Instant::now();
        let mut guard = self.state.lock();
        match *guard {
            State::Closed => false,
            State::Open { until } => {
                if now < until {
                    debug!("pause breaker open remaining_ms={}", until.saturating_duration_since(now).as_millis());
                    true
                } else {
                    info!("pause breaker closed after pause elapsed");
                    *guard = State::Closed;
                    false
                }
            }
        }
    }

    /// Opens the breaker until `now + pause`. A later trip extends an open breaker, never shortens it.
    pub fn trip(&self, pause: Duration) {
        let until = Instant::now() + pause;
        let mut guard = self.state.lock();
        let until = match *guard {
            State::Open { until: current } if current > until => current,
            _ => until,
        };
        warn!("pause breaker tripped pause_ms={}", until.saturating_duration_since(Instant::now()).as_millis());
        *guard = State::Open { until };
    }

    pub fn reset(&self) {
        *self.state.lock() = State::Closed;
    }
}
