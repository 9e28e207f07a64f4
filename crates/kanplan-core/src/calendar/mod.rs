//! Calendar provider contract.
//!
//! The engine treats the calendar as an opaque service: busy-time queries,
//! event creation/deletion and a point check for free slots. Every failure
//! is a single [`ProviderError::Unavailable`].

pub mod local;
pub mod mirror;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::schedule::ScheduledBlock;

pub use local::{CalendarEvent, LocalCalendar};
pub use mirror::{CalendarMirror, MirrorFailure, MirrorReport};

/// Busy time reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Provider event behind this interval, when known
    #[serde(default)]
    pub event_id: Option<String>,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            event_id: None,
        }
    }

    /// Check if this interval overlaps with a time range
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}

impl From<&ScheduledBlock> for BusyInterval {
    fn from(block: &ScheduledBlock) -> Self {
        Self {
            start: block.start_time,
            end: block.end_time,
            event_id: block.provider_event_id.clone(),
        }
    }
}

/// External calendar consumed by the scheduling core.
///
/// Calls may suspend on network I/O; the engine issues them sequentially.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Busy intervals overlapping `[range_start, range_end)`.
    async fn list_busy_intervals(
        &self,
        calendar_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ProviderError>;

    /// Create an event for a block, returning the provider's event id.
    async fn create_event(&self, block: &ScheduledBlock, task_title: &str) -> Result<String, ProviderError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), ProviderError>;

    async fn is_slot_free(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<bool, ProviderError>;
}
