//! Per-category learned statistics and their EMA update rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::estimate::{DEFAULT_CONFIDENCE, DEFAULT_DISTRIBUTION};
use crate::schedule::ActualTime;

/// Exponentially averaged estimation statistics for one category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningRecord {
    pub category: String,
    /// Estimation accuracy in [0, 1]
    pub accuracy: f64,
    pub underestimation_rate: f64,
    pub overestimation_rate: f64,
    /// Incubation/design/implementation/improvement fractions, summing to 1
    pub phase_distribution: [f64; 4],
    pub sample_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// One raw actual-vs-estimated observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningSample {
    pub task_id: String,
    pub category: String,
    pub estimated_total: u32,
    pub actual: ActualTime,
    pub accuracy: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Accuracy of a single observation.
///
/// `1 - |e - a| / max(e, a)`, floored at 0; 1 when both totals are zero and
/// 0 when exactly one is.
pub fn observation_accuracy(estimated_total: u32, actual_total: u32) -> f64 {
    match (estimated_total, actual_total) {
        (0, 0) => 1.0,
        (0, _) | (_, 0) => 0.0,
        (e, a) => {
            let e = f64::from(e);
            let a = f64::from(a);
            (1.0 - (e - a).abs() / e.max(a)).max(0.0)
        }
    }
}

fn blend(alpha: f64, observed: f64, previous: f64) -> f64 {
    alpha * observed + (1.0 - alpha) * previous
}

impl LearningRecord {
    /// Starting point for a category seen for the first time.
    pub fn initial(category: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            category: category.into(),
            accuracy: DEFAULT_CONFIDENCE,
            underestimation_rate: 0.0,
            overestimation_rate: 0.0,
            phase_distribution: DEFAULT_DISTRIBUTION,
            sample_count: 0,
            last_updated: at,
        }
    }

    /// Fold one observation into the averages; returns its accuracy.
    pub fn observe(
        &mut self,
        estimated_total: u32,
        actual: &ActualTime,
        alpha: f64,
        at: DateTime<Utc>,
    ) -> f64 {
        let actual_total = actual.total();
        let observed = observation_accuracy(estimated_total, actual_total);
        self.accuracy = blend(alpha, observed, self.accuracy).clamp(0.0, 1.0);

        if actual_total > estimated_total {
            self.underestimation_rate = blend(alpha, 1.0, self.underestimation_rate);
            self.overestimation_rate = blend(alpha, 0.0, self.overestimation_rate);
        } else if actual_total < estimated_total {
            self.underestimation_rate = blend(alpha, 0.0, self.underestimation_rate);
            self.overestimation_rate = blend(alpha, 1.0, self.overestimation_rate);
        }

        let denominator = f64::from(actual_total.max(1));
        let minutes = actual.phase_minutes();
        let mut blended = [0.0; 4];
        for (i, slot) in blended.iter_mut().enumerate() {
            let observed_fraction = f64::from(minutes[i]) / denominator;
            *slot = blend(alpha, observed_fraction, self.phase_distribution[i]);
        }
        // a zero actual total contributes all-zero fractions; renormalise
        let sum: f64 = blended.iter().sum();
        if sum > 0.0 {
            for slot in &mut blended {
                *slot /= sum;
            }
            self.phase_distribution = blended;
        }

        self.sample_count += 1;
        self.last_updated = at;
        observed
    }

    pub fn distribution_sum(&self) -> f64 {
        self.phase_distribution.iter().sum()
    }
}
