use crate::controller::{Cue, EndReason, SessionCore};
use crate::runtime::CancelToken;
use tracing::{debug, trace};

/// Countdown clock for an active session. Reaching zero is what ends it.
pub(crate) fn run(core: &SessionCore, session_id: u64, token: &CancelToken) {
    let final_ticks = core.config.final_countdown_ticks;

    loop {
        if !token.sleep(core.config.tick) {
            break;
        }

        let remaining = core.with_live_state(session_id, |state| {
            state.time_remaining = state.time_remaining.saturating_sub(1);
            state.final_countdown = state.time_remaining > 0 && state.time_remaining <= final_ticks;
            state.time_remaining
        });

        match remaining {
            None => break,
            Some(0) => {
                core.finish(session_id, EndReason::TimeUp);
                break;
            }
            Some(n) if n <= final_ticks => {
                trace!(session_id, remaining = n, "final countdown");
                core.cues.publish(&Cue::FinalCountdown(n));
            }
            Some(n) => trace!(session_id, remaining = n, "tick"),
        }
    }

    debug!(session_id, "clock stopped");
}
