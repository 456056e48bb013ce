use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Pausable round timer shared by everyone in a room.
///
/// `seconds` only accumulates on pause; while running the visible value is
/// `seconds + (now - last_update_time)`. All instants are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    /// Whether the timer is currently counting.
    pub running: bool,
    /// Seconds accumulated up to `last_update_time`.
    pub seconds: u64,
    /// Wall-clock anchor of the last start/pause, `0` when unset.
    pub last_update_time: i64,
    /// Display goal for a round, if configured.
    pub target_duration_seconds: Option<u32>,
    /// Elapsed value the current round started from.
    pub round_anchor_seconds: u64,
    /// Re-anchor the round when votes are cleared.
    pub auto_reset_on_votes_reset: bool,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            running: false,
            seconds: 0,
            last_update_time: 0,
            target_duration_seconds: None,
            round_anchor_seconds: 0,
            auto_reset_on_votes_reset: true,
        }
    }
}

/// Partial timer configuration coming from `configureTimer`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    /// New display goal; `Some(0)` clears it.
    #[serde(default)]
    pub target_duration_seconds: Option<u32>,
    /// New auto re-anchor flag.
    #[serde(default)]
    pub auto_reset_on_votes_reset: Option<bool>,
}

impl TimerState {
    /// Resume counting from the accumulated value. No-op when already running.
    pub fn start(&mut self, now: i64) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.last_update_time = now;
        true
    }

    /// Fold the running interval into `seconds` and stop. No-op when stopped.
    pub fn pause(&mut self, now: i64) -> bool {
        if !self.running {
            return false;
        }
        self.seconds += whole_seconds_between(self.last_update_time, now);
        self.last_update_time = now;
        self.running = false;
        true
    }

    /// Zero everything but the configuration flags.
    pub fn reset(&mut self) {
        self.running = false;
        self.seconds = 0;
        self.last_update_time = 0;
        self.round_anchor_seconds = 0;
    }

    /// Apply a partial configuration update.
    pub fn configure(&mut self, config: &TimerConfig) {
        if let Some(target) = config.target_duration_seconds {
            self.target_duration_seconds = (target > 0).then_some(target);
        }
        if let Some(auto_reset) = config.auto_reset_on_votes_reset {
            self.auto_reset_on_votes_reset = auto_reset;
        }
    }

    /// Total elapsed seconds at `now`, including the running interval.
    pub fn elapsed_seconds(&self, now: i64) -> u64 {
        if self.running {
            self.seconds + whole_seconds_between(self.last_update_time, now)
        } else {
            self.seconds
        }
    }

    /// Seconds spent in the current round at `now`.
    pub fn round_seconds(&self, now: i64) -> u64 {
        self.elapsed_seconds(now)
            .saturating_sub(self.round_anchor_seconds)
    }

    /// Start a new round at the current elapsed value.
    pub fn anchor_round(&mut self, now: i64) -> u64 {
        self.round_anchor_seconds = self.elapsed_seconds(now);
        self.round_anchor_seconds
    }
}

fn whole_seconds_between(from: i64, to: i64) -> u64 {
    u64::try_from((to - from).max(0) / 1000).unwrap_or(0)
}
