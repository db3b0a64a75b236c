//! Heartbeat timer
//!
//! Ticks every `ping_interval` while running. Missed pongs are not tracked.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Periodic ping schedule
#[derive(Debug)]
pub struct Heartbeat {
    period: Duration,
    timer: Option<Interval>,
}

impl Heartbeat {
    pub fn new(period: Duration) -> Self {
        Self { period, timer: None }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start ticking; the first tick fires one period from now
    pub fn start(&mut self) {
        let mut timer = interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
    }

    pub fn stop(&mut self) {
        self.timer = None;
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Wait for the next tick. Never resolves while stopped.
    ///
    /// Cancel-safe.
    pub async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_period() {
        let mut heartbeat = Heartbeat::new(Duration::from_secs(30));
        heartbeat.start();
        let start = Instant::now();

        heartbeat.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(30));

        heartbeat.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_never_ticks() {
        let mut heartbeat = Heartbeat::new(Duration::from_millis(10));
        heartbeat.start();
        heartbeat.stop();
        assert!(!heartbeat.is_running());

        let result = tokio::time::timeout(Duration::from_secs(5), heartbeat.tick()).await;
        assert!(result.is_err());
    }
}
