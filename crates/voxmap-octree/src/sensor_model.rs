//! Log-odds occupancy update rule.
//!
//! Every cell starts at log-odds 0 (probability 0.5).  A hit adds
//! `logit(prob_hit)`, a miss adds `logit(prob_miss)`, and the result is
//! clamped to `[clamp_min, clamp_max]` after every step.

use voxmap_types::TreeConfig;

/// `ln(p / (1 - p))`.
pub fn logit(probability: f64) -> f32 {
    (probability / (1.0 - probability)).ln() as f32
}

/// Inverse of [`logit`]: `1 / (1 + e^-l)`.
pub fn probability(log_odds: f32) -> f64 {
    1.0 - 1.0 / (1.0 + f64::from(log_odds).exp())
}

/// Per-observation increments and clamping bounds, in log-odds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorModel {
    hit: f32,
    miss: f32,
    clamp_min: f32,
    clamp_max: f32,
}

impl SensorModel {
    /// Build the model from an already validated config.
    pub fn from_config(config: &TreeConfig) -> Self {
        Self {
            hit: logit(config.prob_hit),
            miss: logit(config.prob_miss),
            clamp_min: config.clamp_min as f32,
            clamp_max: config.clamp_max as f32,
        }
    }

    pub fn hit_log_odds(&self) -> f32 {
        self.hit
    }

    pub fn miss_log_odds(&self) -> f32 {
        self.miss
    }

    pub fn clamp_min(&self) -> f32 {
        self.clamp_min
    }

    pub fn clamp_max(&self) -> f32 {
        self.clamp_max
    }

    /// Apply one observation to `log_odds`.
    pub fn apply(&self, log_odds: f32, is_hit: bool) -> f32 {
        let delta = if is_hit { self.hit } else { self.miss };
        (log_odds + delta).clamp(self.clamp_min, self.clamp_max)
    }

    /// True when `log_odds` is inside the clamping bounds.
    pub fn in_bounds(&self, log_odds: f32) -> bool {
        log_odds.is_finite() && log_odds >= self.clamp_min && log_odds <= self.clamp_max
    }
}
