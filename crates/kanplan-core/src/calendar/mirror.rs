//! Mirrors scheduled blocks into the calendar provider.
//!
//! Failures are collected per block; one failed block never stops the rest.

use std::sync::Arc;

use super::CalendarProvider;
use crate::error::ProviderError;
use crate::schedule::{Phase, ScheduledBlock};

/// Why a block could not be mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorFailure {
    /// Something else occupies the slot by now
    SlotTaken { block_id: String, phase: Phase },
    Provider {
        block_id: String,
        phase: Phase,
        error: ProviderError,
    },
}

impl std::fmt::Display for MirrorFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MirrorFailure::SlotTaken { block_id, phase } => {
                write!(f, "{phase} block {block_id}: slot is no longer free")
            }
            MirrorFailure::Provider { block_id, phase, error } => {
                write!(f, "{phase} block {block_id}: {error}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub created: usize,
    pub failures: Vec<MirrorFailure>,
}

impl MirrorReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct CalendarMirror {
    provider: Arc<dyn CalendarProvider>,
}

impl CalendarMirror {
    pub fn new(provider: Arc<dyn CalendarProvider>) -> Self {
        Self { provider }
    }

    /// Create provider events for blocks that have none yet.
    pub async fn mirror(&self, blocks: &mut [ScheduledBlock], task_title: &str) -> MirrorReport {
        let mut report = MirrorReport::default();
        for block in blocks.iter_mut().filter(|b| b.provider_event_id.is_none()) {
            match self.provider.is_slot_free(block.start_time, block.end_time).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(block_id = %block.id, phase = %block.phase, "slot taken, block not mirrored");
                    report.failures.push(MirrorFailure::SlotTaken {
                        block_id: block.id.clone(),
                        phase: block.phase,
                    });
                    continue;
                }
                Err(error) => {
                    report.failures.push(provider_failure(block, error));
                    continue;
                }
            }

            match self.provider.create_event(block, task_title).await {
                Ok(event_id) => {
                    block.provider_event_id = Some(event_id);
                    report.created += 1;
                }
                Err(error) => report.failures.push(provider_failure(block, error)),
            }
        }
        report
    }

    /// Delete the provider events behind `blocks` and clear their ids.
    pub async fn retract(&self, blocks: &mut [ScheduledBlock]) -> Vec<MirrorFailure> {
        let mut failures = Vec::new();
        for block in blocks.iter_mut() {
            let Some(event_id) = block.provider_event_id.clone() else {
                continue;
            };
            match self.provider.delete_event(&event_id).await {
                Ok(()) => block.provider_event_id = None,
                Err(error) => failures.push(provider_failure(block, error)),
            }
        }
        failures
    }
}

fn provider_failure(block: &ScheduledBlock, error: ProviderError) -> MirrorFailure {
    tracing::warn!(block_id = %block.id, phase = %block.phase, error = %error, "block mirroring failed");
    MirrorFailure::Provider {
        block_id: block.id.clone(),
        phase: block.phase,
        error,
    }
}
