//! Fixed-period tick scheduler.
//!
//! A two-state machine: `Disarmed` never fires, `Armed` fires once per period.
//! What a firing does is up to the owner; the scheduler only decides when.
//! The timer is created lazily on the first wait after arming, so arming and
//! disarming work outside a runtime and the first tick lands one full period
//! after arming.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Disarmed,
    Armed,
}

#[derive(Debug)]
pub struct TickScheduler {
    period: Duration,
    state: SchedulerState,
    timer: Option<Interval>,
}

impl TickScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            state: SchedulerState::Disarmed,
            timer: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == SchedulerState::Armed
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Starts the recurring timer. Arming an armed scheduler keeps its phase.
    pub fn arm(&mut self) {
        if self.is_armed() {
            return;
        }
        self.state = SchedulerState::Armed;
        self.timer = None;
    }

    /// Cancels the recurring timer. No firing is observed after this returns.
    pub fn disarm(&mut self) {
        self.state = SchedulerState::Disarmed;
        self.timer = None;
    }

    /// Resolves at the next firing. Never resolves while disarmed.
    ///
    /// Cancel-safe: dropping the future before it resolves loses no firing.
    pub async fn wait(&mut self) {
        if !self.is_armed() {
            return std::future::pending().await;
        }

        let period = self.period;
        let timer = self.timer.get_or_insert_with(|| {
            let mut timer = interval_at(Instant::now() + period, period);
            // Late firings are dropped rather than replayed in a burst
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });
        timer.tick().await;
    }
}
