//! Repeater time-out countdown.
//!
//! Once the radio is seen transmitting into a repeater input, the repeater's
//! time-out timer is running. [`TimeoutListener`] mirrors it so the operator
//! is warned before the repeater drops them. The deadline is pulled in by
//! [`TIMEOUT_MARGIN`] since the radio only reports the key-up after the fact.
//!
//! The state machine takes explicit instants. [`TimerHandle`] runs it on a
//! tokio task and publishes each tick to the [`PropertyStore`].

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::properties::{Property, PropertyStore};

pub const TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Tick spacing while far from the deadline.
const COARSE_TICK: Duration = Duration::from_secs(10);
/// Tick spacing in the last [`COARSE_TICK`] before the deadline.
const FINE_TICK: Duration = Duration::from_secs(1);

pub const EXPIRED_TEXT: &str = "TIMEOUT!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Counting { deadline: Instant },
    Expired,
    Stopped,
}

/// What the countdown wants reported next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still counting: show `remaining_secs`, then wait `wait`.
    Remaining { remaining_secs: u64, wait: Duration },
    Expired,
}

impl Tick {
    pub fn text(&self) -> String {
        match self {
            Tick::Remaining { remaining_secs, .. } => format!("Ticking...{remaining_secs}"),
            Tick::Expired => EXPIRED_TEXT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutListener {
    timeout: Duration,
    state: TimerState,
}

impl TimeoutListener {
    pub fn new(timeout_secs: u32) -> Self {
        Self {
            timeout: Duration::from_secs(u64::from(timeout_secs)),
            state: TimerState::Idle,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Begin counting from `now`. Only an idle listener starts.
    pub fn start(&mut self, now: Instant) {
        if self.state == TimerState::Idle {
            let deadline = now + self.timeout.saturating_sub(TIMEOUT_MARGIN);
            self.state = TimerState::Counting { deadline };
        }
    }

    /// Advance to `now`. `None` once the countdown is over or was never started.
    pub fn tick(&mut self, now: Instant) -> Option<Tick> {
        let TimerState::Counting { deadline } = self.state else {
            return None;
        };
        if now >= deadline {
            self.state = TimerState::Expired;
            return Some(Tick::Expired);
        }
        let remaining = deadline - now;
        let wait = if remaining > COARSE_TICK { COARSE_TICK } else { FINE_TICK };
        Some(Tick::Remaining {
            remaining_secs: remaining.as_secs_f64().round() as u64,
            wait,
        })
    }

    pub fn stop(&mut self) {
        if matches!(self.state, TimerState::Idle | TimerState::Counting { .. }) {
            self.state = TimerState::Stopped;
        }
    }
}

/// Run a countdown to completion, publishing every tick as [`Property::Timer`].
pub async fn run_countdown(timeout_secs: u32, props: Arc<dyn PropertyStore>) {
    let mut listener = TimeoutListener::new(timeout_secs);
    listener.start(Instant::now());
    while let Some(tick) = listener.tick(Instant::now()) {
        props.update(Property::Timer, tick.text());
        match tick {
            Tick::Remaining { wait, .. } => tokio::time::sleep(wait).await,
            Tick::Expired => info!("repeater time-out reached"),
        }
    }
}

/// A countdown running on its own task. Stopping or dropping aborts it.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Spawn on the current tokio runtime.
    pub fn spawn(timeout_secs: u32, props: Arc<dyn PropertyStore>) -> Self {
        debug!("starting {timeout_secs}s countdown");
        Self {
            task: tokio::spawn(run_countdown(timeout_secs, props)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
