use core::time::Duration;
use tokio::time::Instant;
use log::*;


/// when to complain about a degraded bus
#[derive(Copy, Clone, Debug)]
pub struct StatisticsConfig {
    /// duration over which the success ratio is computed
    pub window: Duration,
    /// failure ratio of a window above which a warning is logged
    pub failure_ratio: f32,
    /// minimum time between two warnings
    pub warning_interval: Duration,
}
impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(1),
            failure_ratio: 0.5,
            warning_interval: Duration::from_secs(10),
        }
    }
}

/// transmission counters of a bus, updated by each physical attempt
#[derive(Copy, Clone, Debug)]
pub struct Statistics {
    /// physical attempts since creation or last reset
    pub attempts: u64,
    /// failed physical attempts since creation or last reset
    pub failures: u64,
    /// success ratio of the last complete window, if any
    pub ratio: Option<f32>,
    window: Window,
    last_warning: Option<Instant>,
}
#[derive(Copy, Clone, Debug)]
struct Window {
    start: Instant,
    attempts: u32,
    failures: u32,
}

impl Statistics {
    pub fn new(now: Instant) -> Self {
        Self {
            attempts: 0,
            failures: 0,
            ratio: None,
            window: Window {start: now, attempts: 0, failures: 0},
            last_warning: None,
        }
    }
    /**
        account for one attempt finishing at `now`

        returns true if this attempt closed a window degraded enough to report, in which case a warning has been logged
    */
    pub fn record(&mut self, success: bool, now: Instant, config: &StatisticsConfig) -> bool {
        let mut warned = false;
        if now.saturating_duration_since(self.window.start) >= config.window {
            warned = self.roll(now, config);
        }
        self.attempts += 1;
        self.window.attempts = self.window.attempts.saturating_add(1);
        if !success {
            self.failures += 1;
            self.window.failures = self.window.failures.saturating_add(1);
        }
        warned
    }
    /// overall success ratio since creation or last reset
    pub fn success_ratio(&self) -> f32 {
        if self.attempts == 0  {1.}
        else  {1. - self.failures as f32 / self.attempts as f32}
    }

    fn roll(&mut self, now: Instant, config: &StatisticsConfig) -> bool {
        let Window {attempts, failures, ..} = self.window;
        self.window = Window {start: now, attempts: 0, failures: 0};
        if attempts == 0 {
            return false;
        }
        let failure_ratio = failures as f32 / attempts as f32;
        self.ratio = Some(1. - failure_ratio);

        let quiet = self.last_warning.is_none_or(|last|
            now.saturating_duration_since(last) >= config.warning_interval);
        if failure_ratio > config.failure_ratio && quiet {
            warn!("bus degraded: {} of {} transmissions failed in last window, {} of {} overall",
                failures, attempts, self.failures, self.attempts);
            self.last_warning = Some(now);
            return true;
        }
        false
    }
}
