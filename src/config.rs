//! Engine configuration
//!
//! Tunables for the progress, settlement, and badge components. The embedding
//! application constructs one `EngineConfig` and shares it across services.

/// Engine-wide tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum percentage of correct quiz answers to pass (0-100).
    /// Tasks may override this in their quiz verification config.
    pub quiz_passing_percent: f64,

    /// Multiplier gained per consecutive successful completion
    pub streak_multiplier_step: f64,

    /// Streak value at which the multiplier stops growing
    pub streak_cap: i32,

    /// Lifetime points per user level (level = points / points_per_level + 1)
    pub points_per_level: i64,

    /// Achievement-unlock bonus credited per badge grant
    pub badge_bonus_points: i64,

    /// Maximum badge-evaluation passes per trigger. Bonus points from one
    /// grant can make further point-threshold badges eligible, so evaluation
    /// loops until stable or this cap.
    pub badge_max_passes: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quiz_passing_percent: 70.0,
            streak_multiplier_step: 0.1,
            streak_cap: 7,
            points_per_level: 1000,
            badge_bonus_points: 50,
            badge_max_passes: 4,
        }
    }
}

impl EngineConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.quiz_passing_percent) {
            return Err("quiz_passing_percent must be within 0-100".to_string());
        }
        if self.streak_multiplier_step < 0.0 {
            return Err("streak_multiplier_step must not be negative".to_string());
        }
        if self.streak_cap < 0 {
            return Err("streak_cap must not be negative".to_string());
        }
        if self.points_per_level <= 0 {
            return Err("points_per_level must be positive".to_string());
        }
        if self.badge_max_passes == 0 {
            return Err("badge_max_passes must be at least 1".to_string());
        }
        Ok(())
    }
}
