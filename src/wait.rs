//! Bounded polling: eventual-consistency detection with a timeout.
//!
//! The host exposes no "selection complete" signal, so confirmation is
//! inferred by polling observable state until a predicate holds or the
//! deadline passes.

use std::time::Duration;

/// Timing knobs for the speculative switch confirmation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchTiming {
    /// How long a speculative switch waits for the host to confirm.
    pub confirm_timeout: Duration,
    /// Poll interval for the confirmation wait.
    pub poll_interval: Duration,
}

impl Default for SwitchTiming {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Poll `probe` every `interval` until it yields a value or `timeout`
/// elapses. The probe runs at least once, immediately; waits are
/// cooperative and never block the runtime.
pub async fn wait_until<T, F>(mut probe: F, timeout: Duration, interval: Duration) -> Option<T>
where
    F: FnMut() -> Option<T>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = probe() {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(interval).await;
    }
}
