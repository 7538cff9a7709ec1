use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub grid_size: usize,
    pub duration_ticks: u32,
    pub countdown_ticks: u32,
    /// Remaining ticks at or below which the final countdown flag is raised.
    pub final_countdown_ticks: u32,
    /// Real-time length of one clock unit.
    pub tick: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grid_size: 9,
            duration_ticks: 30,
            countdown_ticks: 3,
            final_countdown_ticks: 3,
            tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    Idle,
    Countdown,
    Active,
    Ended,
}

/// Snapshot of one play-through. Owned by the session controller; everything
/// else sees clones.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Increases on every start/reset so stale loops can tell they are stale.
    pub session_id: u64,
    pub phase: Phase,
    pub level: u32,
    pub active_target: Option<usize>,
    pub score: u64,
    pub hits: u32,
    pub misses: u32,
    pub combo: u32,
    pub hits_this_level: u32,
    pub highest_level_reached: u32,
    pub time_remaining: u32,
    pub countdown_remaining: u32,
    pub final_countdown: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session_id: 0,
            phase: Phase::Idle,
            level: 1,
            active_target: None,
            score: 0,
            hits: 0,
            misses: 0,
            combo: 0,
            hits_this_level: 0,
            highest_level_reached: 1,
            time_remaining: 0,
            countdown_remaining: 0,
            final_countdown: false,
        }
    }
}

impl SessionState {
    /// Fresh state for a session entering countdown at `level`.
    pub fn starting(session_id: u64, level: u32, config: &SessionConfig) -> Self {
        Self {
            session_id,
            phase: Phase::Countdown,
            level,
            highest_level_reached: level,
            time_remaining: config.duration_ticks,
            countdown_remaining: config.countdown_ticks,
            ..Self::default()
        }
    }

    /// True while the loops of session `session_id` may still mutate state.
    pub fn is_live(&self, session_id: u64) -> bool {
        self.phase == Phase::Active && self.session_id == session_id
    }

    /// Clear the target only if it is still `cell`. Returns whether it cleared.
    pub fn clear_target_if(&mut self, cell: usize) -> bool {
        if self.active_target == Some(cell) {
            self.active_target = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_state_resets_counters() {
        let config = SessionConfig::default();
        let state = SessionState::starting(7, 3, &config);
        assert_eq!(state.session_id, 7);
        assert_eq!(state.phase, Phase::Countdown);
        assert_eq!(state.level, 3);
        assert_eq!(state.highest_level_reached, 3);
        assert_eq!(state.time_remaining, 30);
        assert_eq!(state.countdown_remaining, 3);
        assert_eq!(state.score, 0);
        assert_eq!(state.active_target, None);
    }

    #[test]
    fn liveness_requires_active_phase_and_matching_id() {
        let mut state = SessionState::starting(2, 1, &SessionConfig::default());
        assert!(!state.is_live(2));
        state.phase = Phase::Active;
        assert!(state.is_live(2));
        assert!(!state.is_live(1));
        state.phase = Phase::Ended;
        assert!(!state.is_live(2));
    }

    #[test]
    fn compare_and_clear_only_clears_expected_cell() {
        let mut state = SessionState {
            active_target: Some(4),
            ..SessionState::default()
        };
        assert!(!state.clear_target_if(3));
        assert_eq!(state.active_target, Some(4));
        assert!(state.clear_target_if(4));
        assert_eq!(state.active_target, None);
        assert!(!state.clear_target_if(4));
    }
}
