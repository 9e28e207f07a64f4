//! Free-time discovery inside working hours.
//!
//! - [`gap`]: pure gap computation between busy intervals
//! - [`availability`]: day-by-day provider queries with optimistic fallback

pub mod availability;
pub mod gap;

pub use availability::{AvailabilityFinder, FreeSlots};
pub use gap::GapFinder;

/// Shortest gap that counts as a free slot, and the smallest block worth placing.
pub const MIN_SLOT_MINUTES: i64 = 30;
