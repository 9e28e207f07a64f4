//! Gap detection between busy intervals.
//!
//! Finds the free slots of one working window, keeping a buffer on both sides
//! of every busy interval.

use chrono::{DateTime, Duration, Utc};

use super::MIN_SLOT_MINUTES;
use crate::calendar::BusyInterval;
use crate::schedule::TimeSlot;

/// Detector for free slots within a window.
#[derive(Debug, Clone)]
pub struct GapFinder {
    /// Minimum slot duration to report (in minutes)
    min_gap_minutes: i64,
    /// Minutes kept free next to busy intervals
    buffer_minutes: i64,
}

impl GapFinder {
    /// Create a finder with the default minimum and no buffer
    pub fn new() -> Self {
        Self {
            min_gap_minutes: MIN_SLOT_MINUTES,
            buffer_minutes: 0,
        }
    }

    pub fn with_min_gap(mut self, minutes: i64) -> Self {
        self.min_gap_minutes = minutes;
        self
    }

    pub fn with_buffer(mut self, minutes: i64) -> Self {
        self.buffer_minutes = minutes.max(0);
        self
    }

    /// Free slots in `[window_start, window_end)` around `busy`, sorted by start.
    ///
    /// Overlapping busy intervals are absorbed by a monotonic cursor.
    pub fn find_gaps(
        &self,
        busy: &[BusyInterval],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<TimeSlot> {
        let buffer = Duration::minutes(self.buffer_minutes);
        let mut sorted: Vec<&BusyInterval> = busy
            .iter()
            .filter(|b| b.overlaps(window_start, window_end))
            .collect();
        sorted.sort_by_key(|b| b.start);

        let mut gaps = Vec::new();
        let mut cursor = window_start;

        for interval in sorted {
            if cursor >= window_end {
                break;
            }
            let gap_end = (interval.start - buffer).min(window_end);
            if gap_end > cursor {
                self.push_if_long_enough(&mut gaps, cursor, gap_end);
            }
            cursor = cursor.max(interval.end + buffer);
        }

        if cursor < window_end {
            self.push_if_long_enough(&mut gaps, cursor, window_end);
        }

        gaps
    }

    fn push_if_long_enough(&self, gaps: &mut Vec<TimeSlot>, start: DateTime<Utc>, end: DateTime<Utc>) {
        let slot = TimeSlot::new(start, end);
        if slot.duration_minutes >= self.min_gap_minutes {
            gaps.push(slot);
        }
    }
}

impl Default for GapFinder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn empty_window_is_one_slot() {
        let gaps = GapFinder::new().find_gaps(&[], at(9, 0), at(18, 0));
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].duration_minutes, 540);
    }

    #[test]
    fn buffer_shrinks_both_edges() {
        let busy = vec![
            BusyInterval::new(at(11, 0), at(12, 0)),
            BusyInterval::new(at(10, 0), at(10, 30)),
        ];
        let gaps = GapFinder::new().with_buffer(15).find_gaps(&busy, at(9, 0), at(18, 0));
        // 10:30+15 .. 11:00-15 leaves nothing between the two meetings
        assert_eq!(gaps.len(), 2);
        assert_eq!((gaps[0].start, gaps[0].end), (at(9, 0), at(9, 45)));
        assert_eq!((gaps[1].start, gaps[1].end), (at(12, 15), at(18, 0)));
    }

    #[test]
    fn short_gaps_are_dropped() {
        let busy = vec![
            BusyInterval::new(at(9, 20), at(10, 0)),
            BusyInterval::new(at(10, 25), at(17, 40)),
        ];
        let gaps = GapFinder::new().find_gaps(&busy, at(9, 0), at(18, 0));
        assert!(gaps.is_empty());
    }

    #[test]
    fn overlapping_and_outside_intervals() {
        let busy = vec![
            BusyInterval::new(at(7, 0), at(9, 30)),
            BusyInterval::new(at(12, 0), at(14, 0)),
            BusyInterval::new(at(13, 0), at(13, 30)),
            BusyInterval::new(at(19, 0), at(20, 0)),
        ];
        let gaps = GapFinder::new().find_gaps(&busy, at(9, 0), at(18, 0));
        assert_eq!(gaps.len(), 2);
        assert_eq!((gaps[0].start, gaps[0].end), (at(9, 30), at(12, 0)));
        assert_eq!((gaps[1].start, gaps[1].end), (at(14, 0), at(18, 0)));
    }
}
