//! Phase-duration estimation.
//!
//! The estimator is a pure function of a task and (optionally) the learned
//! statistics for its category. Learned statistics are reached through the
//! [`LearningLookup`] trait so the composing layer decides where they live.

pub mod category;

use std::sync::Arc;

use crate::learning::LearningRecord;
use crate::schedule::Estimation;
use crate::storage::EstimationConfig;
use crate::task::{Priority, Task};

pub use category::{category_for, GENERAL_CATEGORY};

/// Incubation/design/implementation/improvement split without learned data.
pub const DEFAULT_DISTRIBUTION: [f64; 4] = [0.2, 0.3, 0.4, 0.1];

/// Confidence reported without learned data.
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

/// Rate above which a category is considered biased.
pub const BIAS_THRESHOLD: f64 = 0.6;

/// Total scaling for consistently underestimated categories.
pub const UNDERESTIMATION_SCALE: f64 = 1.2;

/// Total scaling for consistently overestimated categories.
pub const OVERESTIMATION_SCALE: f64 = 0.9;

/// Read access to learned per-category statistics.
pub trait LearningLookup: Send + Sync {
    fn lookup(&self, category: &str) -> Option<LearningRecord>;
}

/// Produces phase breakdowns for tasks.
#[derive(Clone, Default)]
pub struct Estimator {
    config: EstimationConfig,
    learning: Option<Arc<dyn LearningLookup>>,
}

impl Estimator {
    /// Create an estimator with default constants and no learned data.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EstimationConfig) -> Self {
        Self {
            config,
            learning: None,
        }
    }

    /// Consult `learning` for every estimate.
    pub fn with_learning(mut self, learning: Arc<dyn LearningLookup>) -> Self {
        self.learning = Some(learning);
        self
    }

    pub fn config(&self) -> &EstimationConfig {
        &self.config
    }

    /// Estimate a task using the injected learning lookup, if any.
    pub fn estimate(&self, task: &Task) -> Estimation {
        let record = self
            .learning
            .as_ref()
            .and_then(|learning| learning.lookup(&category_for(task)));
        self.estimate_with(task, record.as_ref())
    }

    /// Estimate a task against an explicit learning record.
    pub fn estimate_with(&self, task: &Task, record: Option<&LearningRecord>) -> Estimation {
        let base = self.base_minutes(task.priority);

        let Some(record) = record else {
            return Estimation::from_phases(split_minutes(base, DEFAULT_DISTRIBUTION), DEFAULT_CONFIDENCE);
        };

        let total = if record.underestimation_rate > BIAS_THRESHOLD {
            scale_floor(base, UNDERESTIMATION_SCALE)
        } else if record.overestimation_rate > BIAS_THRESHOLD {
            scale_floor(base, OVERESTIMATION_SCALE)
        } else {
            base
        };

        Estimation::from_phases(
            split_minutes(total, record.phase_distribution),
            record.accuracy,
        )
    }

    /// Default duration scaled by priority, floored.
    pub fn base_minutes(&self, priority: Priority) -> u32 {
        let multiplier = match priority {
            Priority::High => self.config.high_multiplier,
            Priority::Normal => self.config.normal_multiplier,
            Priority::Low => self.config.low_multiplier,
        };
        scale_floor(self.config.base_minutes, multiplier)
    }
}

fn scale_floor(minutes: u32, factor: f64) -> u32 {
    // epsilon absorbs products like 60 * 1.2 = 71.999...
    (f64::from(minutes) * factor + 1e-9).floor().max(0.0) as u32
}

/// Split `total` by `fractions`; implementation absorbs the rounding remainder.
pub fn split_minutes(total: u32, fractions: [f64; 4]) -> [u32; 4] {
    let incubation = scale_floor(total, fractions[0]);
    let design = scale_floor(total, fractions[1]);
    let improvement = scale_floor(total, fractions[3]);
    let fixed = incubation.saturating_add(design).saturating_add(improvement);
    if fixed > total {
        // fractions that overshoot: give everything to implementation
        return [0, 0, total, 0];
    }
    [incubation, design, total - fixed, improvement]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn record(accuracy: f64, under: f64, over: f64, fractions: [f64; 4]) -> LearningRecord {
        LearningRecord {
            category: "x".into(),
            accuracy,
            underestimation_rate: under,
            overestimation_rate: over,
            phase_distribution: fractions,
            sample_count: 3,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn default_split_for_normal_priority() {
        let est = Estimator::new().estimate(&Task::new("Groceries"));
        assert_eq!(est.phase_minutes(), [12, 18, 24, 6]);
        assert_eq!(est.total, 60);
        assert_eq!(est.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn priority_scales_base() {
        let estimator = Estimator::new();
        let high = estimator.estimate(&Task::new("a").with_priority(Priority::High));
        assert_eq!(high.total, 90);
        assert_eq!(high.phase_minutes(), [18, 27, 36, 9]);

        let low = estimator.estimate(&Task::new("a").with_priority(Priority::Low));
        assert_eq!(low.total, 42);
        // 8 + 12 + 4 floored, remainder to implementation
        assert_eq!(low.phase_minutes(), [8, 12, 18, 4]);
    }

    #[test]
    fn underestimated_category_gets_longer_total() {
        let rec = record(0.5, 0.7, 0.1, DEFAULT_DISTRIBUTION);
        let est = Estimator::new().estimate_with(&Task::new("a"), Some(&rec));
        assert_eq!(est.total, 72);
        assert_eq!(est.confidence, 0.5);
    }

    #[test]
    fn overestimated_category_gets_shorter_total() {
        let rec = record(0.8, 0.1, 0.65, [0.25, 0.25, 0.25, 0.25]);
        let est = Estimator::new().estimate_with(&Task::new("a"), Some(&rec));
        assert_eq!(est.total, 54);
        assert_eq!(est.phase_minutes(), [13, 13, 15, 13]);
    }

    struct Fixed(LearningRecord);

    impl LearningLookup for Fixed {
        fn lookup(&self, category: &str) -> Option<LearningRecord> {
            (category == "writing").then(|| self.0.clone())
        }
    }

    #[test]
    fn injected_lookup_is_consulted_by_category() {
        let rec = record(0.9, 0.0, 0.0, [0.1, 0.1, 0.7, 0.1]);
        let estimator = Estimator::new().with_learning(Arc::new(Fixed(rec)));
        let learned = estimator.estimate(&Task::new("Write blog post"));
        assert_eq!(learned.phase_minutes(), [6, 6, 42, 6]);
        let default = estimator.estimate(&Task::new("Groceries"));
        assert_eq!(default.phase_minutes(), [12, 18, 24, 6]);
    }

    proptest! {
        #[test]
        fn phases_always_sum_to_total(
            total in 0u32..10_000,
            a in 0.0f64..1.0,
            b in 0.0f64..1.0,
            c in 0.0f64..1.0,
            d in 0.0f64..1.0,
        ) {
            let sum = a + b + c + d;
            prop_assume!(sum > 0.0);
            let fractions = [a / sum, b / sum, c / sum, d / sum];
            let split = split_minutes(total, fractions);
            prop_assert_eq!(split.iter().sum::<u32>(), total);
            let est = Estimation::from_phases(split, 0.5);
            prop_assert!(est.validate().is_ok());
        }
    }
}
