use crate::controller::SessionCore;
use crate::runtime::CancelToken;
use rand::Rng;
use tracing::{debug, trace};

/// Pick a cell uniformly from `0..grid_size`, never `exclude`.
pub fn pick_cell<R: Rng + ?Sized>(rng: &mut R, grid_size: usize, exclude: Option<usize>) -> usize {
    match exclude {
        Some(ex) if grid_size > 1 && ex < grid_size => {
            let n = rng.gen_range(0..grid_size - 1);
            if n >= ex {
                n + 1
            } else {
                n
            }
        }
        _ => rng.gen_range(0..grid_size.max(1)),
    }
}

/// Target lifecycle loop: spawn, stay visible, hide if still there, pause.
///
/// Runs until the session stops being live or `token` is cancelled. Timings
/// are read from the current level on every pass.
pub(crate) fn run(core: &SessionCore, session_id: u64, token: &CancelToken) {
    let mut rng = rand::thread_rng();
    let mut last_cell = None;

    loop {
        let spawned = core.with_live_state(session_id, |state| {
            let cell = pick_cell(&mut rng, core.config.grid_size, last_cell);
            state.active_target = Some(cell);
            (cell, state.level)
        });
        let Some((cell, level)) = spawned else {
            break;
        };
        last_cell = Some(cell);
        debug!(session_id, cell, level, "target spawned");

        if !token.sleep(core.difficulty.visible_duration(level)) {
            break;
        }

        // compare-and-clear: a hit or a newer spawn already owns the field
        let hidden = core.with_live_state(session_id, |state| {
            (state.clear_target_if(cell), state.level)
        });
        let Some((cleared, level)) = hidden else {
            break;
        };
        if cleared {
            trace!(session_id, cell, "target hidden");
        }

        if !token.sleep(core.difficulty.spawn_gap(level)) {
            break;
        }
    }

    debug!(session_id, "spawn loop stopped");
}
