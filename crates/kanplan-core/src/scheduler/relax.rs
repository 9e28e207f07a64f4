//! Relaxation ladder applied when strict allocation runs out of capacity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schedule::Estimation;

/// Constraint-loosening constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelaxationPolicy {
    /// Days added to the deadline on the first rung
    #[serde(default = "default_extension_days")]
    pub extension_days: i64,
    /// Buffer is divided by this on the second rung
    #[serde(default = "default_buffer_divisor")]
    pub buffer_divisor: u32,
    /// Halved buffer never drops below this (unless it already was)
    #[serde(default = "default_min_buffer")]
    pub min_buffer_minutes: u32,
    /// Fraction removed from every phase on the third rung
    #[serde(default = "default_shrink_fraction")]
    pub shrink_fraction: f64,
}

fn default_extension_days() -> i64 {
    7
}
fn default_buffer_divisor() -> u32 {
    2
}
fn default_min_buffer() -> u32 {
    5
}
fn default_shrink_fraction() -> f64 {
    0.3
}

impl Default for RelaxationPolicy {
    fn default() -> Self {
        Self {
            extension_days: default_extension_days(),
            buffer_divisor: default_buffer_divisor(),
            min_buffer_minutes: default_min_buffer(),
            shrink_fraction: default_shrink_fraction(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxationStep {
    ExtendDeadline,
    ReduceBuffer,
    ShrinkPhases,
}

impl fmt::Display for RelaxationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelaxationStep::ExtendDeadline => "extend_deadline",
            RelaxationStep::ReduceBuffer => "reduce_buffer",
            RelaxationStep::ShrinkPhases => "shrink_phases",
        })
    }
}

/// Constraints for one retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxedAttempt {
    pub step: RelaxationStep,
    pub deadline: DateTime<Utc>,
    pub buffer_minutes: u32,
    pub estimation: Estimation,
}

impl RelaxationPolicy {
    pub fn reduced_buffer(&self, buffer_minutes: u32) -> u32 {
        let halved = buffer_minutes / self.buffer_divisor.max(1);
        halved.max(self.min_buffer_minutes).min(buffer_minutes)
    }

    /// The three rungs, in order.
    ///
    /// Only the first rung moves the deadline; the third keeps the reduced
    /// buffer of the second.
    pub fn ladder(
        &self,
        deadline: DateTime<Utc>,
        buffer_minutes: u32,
        estimation: &Estimation,
    ) -> [RelaxedAttempt; 3] {
        let reduced = self.reduced_buffer(buffer_minutes);
        [
            RelaxedAttempt {
                step: RelaxationStep::ExtendDeadline,
                deadline: deadline + Duration::days(self.extension_days),
                buffer_minutes,
                estimation: *estimation,
            },
            RelaxedAttempt {
                step: RelaxationStep::ReduceBuffer,
                deadline,
                buffer_minutes: reduced,
                estimation: *estimation,
            },
            RelaxedAttempt {
                step: RelaxationStep::ShrinkPhases,
                deadline,
                buffer_minutes: reduced,
                estimation: estimation.shrunk_by(self.shrink_fraction),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn buffer_is_halved_with_floor() {
        let policy = RelaxationPolicy::default();
        assert_eq!(policy.reduced_buffer(30), 15);
        assert_eq!(policy.reduced_buffer(8), 5);
        assert_eq!(policy.reduced_buffer(3), 3);
    }

    #[test]
    fn ladder_order_and_values() {
        let policy = RelaxationPolicy::default();
        let deadline = Utc.with_ymd_and_hms(2026, 3, 2, 17, 0, 0).unwrap();
        let est = Estimation::from_phases([12, 18, 24, 6], 0.7);
        let ladder = policy.ladder(deadline, 20, &est);

        assert_eq!(ladder[0].step, RelaxationStep::ExtendDeadline);
        assert_eq!(ladder[0].deadline, deadline + Duration::days(7));
        assert_eq!(ladder[0].buffer_minutes, 20);

        assert_eq!(ladder[1].deadline, deadline);
        assert_eq!(ladder[1].buffer_minutes, 10);

        assert_eq!(ladder[2].estimation.total, 40);
        assert_eq!(ladder[2].deadline, deadline);
    }
}
