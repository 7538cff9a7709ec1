use std::time::Duration;

/// Scaling law mapping a level to target timing and points.
///
/// All fields are tunable; `Default` carries the reference constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyModel {
    pub decay_rate: f64,
    pub base_visible_ms: f64,
    pub visible_floor_ms: f64,
    pub base_gap_ms: f64,
    pub gap_floor_ms: f64,
    pub base_hit_points: u64,
    pub per_level_point_bonus: u64,
    pub combo_bonus: u64,
    pub hits_per_level: u32,
}

impl Default for DifficultyModel {
    fn default() -> Self {
        Self {
            decay_rate: 0.90,
            base_visible_ms: 1300.0,
            visible_floor_ms: 300.0,
            base_gap_ms: 300.0,
            gap_floor_ms: 100.0,
            base_hit_points: 10,
            per_level_point_bonus: 2,
            combo_bonus: 5,
            hits_per_level: 5,
        }
    }
}

impl DifficultyModel {
    fn decayed_ms(&self, base_ms: f64, floor_ms: f64, level: u32) -> Duration {
        let steps = level.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ms = (base_ms * self.decay_rate.powi(steps)).max(floor_ms);
        Duration::from_millis(ms.round() as u64)
    }

    /// How long a spawned target stays up at `level`.
    pub fn visible_duration(&self, level: u32) -> Duration {
        self.decayed_ms(self.base_visible_ms, self.visible_floor_ms, level)
    }

    /// Pause between a target going away and the next spawn.
    pub fn spawn_gap(&self, level: u32) -> Duration {
        self.decayed_ms(self.base_gap_ms, self.gap_floor_ms, level)
    }

    pub fn points_for_hit(&self, level: u32) -> u64 {
        self.base_hit_points + u64::from(level) * self.per_level_point_bonus
    }

    /// Extra points for the `combo`-th consecutive hit. The first hit of a
    /// streak earns no bonus.
    pub fn combo_bonus(&self, combo: u32) -> u64 {
        self.combo_bonus * u64::from(combo.saturating_sub(1))
    }
}

/// Human readable tier for a level, stored alongside score records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum DifficultyLabel {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl DifficultyLabel {
    pub fn for_level(level: u32) -> Self {
        match level {
            0..=2 => DifficultyLabel::Easy,
            3..=4 => DifficultyLabel::Medium,
            5..=7 => DifficultyLabel::Hard,
            _ => DifficultyLabel::Expert,
        }
    }
}

/// Best-score thresholds that unlock a starting level.
const UNLOCK_THRESHOLDS: [(u32, u64); 3] = [(1, 0), (3, 1000), (5, 1500)];

/// The set of starting levels a player may pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockedLevels(Vec<u32>);

impl UnlockedLevels {
    pub fn from_best_score(best_score: u64) -> Self {
        Self(
            UNLOCK_THRESHOLDS
                .iter()
                .filter(|(_, threshold)| best_score >= *threshold)
                .map(|(level, _)| *level)
                .collect(),
        )
    }

    pub fn contains(&self, level: u32) -> bool {
        self.0.contains(&level)
    }

    pub fn levels(&self) -> &[u32] {
        &self.0
    }
}

impl Default for UnlockedLevels {
    fn default() -> Self {
        Self::from_best_score(0)
    }
}
