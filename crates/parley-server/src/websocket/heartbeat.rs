//! Heartbeat ping/pong liveness timing.

use std::time::Duration;

use tokio::time::Instant;

/// Ping/pong timing for one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How long the read side waits for a pong.
    pub pong_wait: Duration,
    /// How often the write side sends a ping. Always below `pong_wait`.
    pub ping_interval: Duration,
}

impl HeartbeatConfig {
    /// Timing for a given pong window. Pings go out at 9/10 of it.
    pub fn new(pong_wait: Duration) -> Self {
        let pong_wait = pong_wait.max(Duration::from_millis(10));
        Self {
            pong_wait,
            ping_interval: pong_wait * 9 / 10,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// The read pump's liveness deadline. Only a pong moves it forward.
#[derive(Debug)]
pub struct ReadDeadline {
    deadline: Instant,
    window: Duration,
}

impl ReadDeadline {
    /// Deadline `window` from now.
    pub fn new(window: Duration) -> Self {
        Self {
            deadline: Instant::now() + window,
            window,
        }
    }

    /// Push the deadline `window` past now.
    pub fn refresh(&mut self) {
        self.deadline = Instant::now() + self.window;
    }

    /// The current deadline.
    pub fn at(&self) -> Instant {
        self.deadline
    }

    /// The window length.
    pub fn window(&self) -> Duration {
        self.window
    }
}
