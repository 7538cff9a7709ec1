use crate::difficulty::DifficultyModel;
use crate::session::SessionState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapOutcome {
    Hit,
    Miss,
}

impl TapOutcome {
    pub fn is_hit(self) -> bool {
        self == TapOutcome::Hit
    }
}

/// Resolve a tap on `tapped` against `state`, returning the next state.
///
/// A hit consumes the target, so the same target can never score twice.
/// Any other tap, including one while nothing is visible, is a miss and
/// breaks the combo.
pub fn resolve_tap(
    state: &SessionState,
    tapped: usize,
    model: &DifficultyModel,
) -> (SessionState, TapOutcome) {
    let mut next = state.clone();

    if state.active_target != Some(tapped) {
        next.misses += 1;
        next.combo = 0;
        return (next, TapOutcome::Miss);
    }

    next.hits += 1;
    next.combo += 1;
    next.hits_this_level += 1;
    if next.hits_this_level >= model.hits_per_level {
        next.level += 1;
        next.hits_this_level = 0;
        next.highest_level_reached = next.highest_level_reached.max(next.level);
    }
    next.score += model.points_for_hit(next.level) + model.combo_bonus(next.combo);
    next.active_target = None;

    (next, TapOutcome::Hit)
}
