//! Learning store: per-category estimation accuracy and phase distribution.
//!
//! Each recorded actual time is folded into an exponential moving average for
//! the task's category. The estimator reads these records back through
//! [`LearningLookup`] to adjust totals and phase splits.

mod record;

pub use record::{observation_accuracy, LearningRecord, LearningSample};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::StorageError;
use crate::estimate::{category_for, Estimator, LearningLookup};
use crate::schedule::{ActualTime, Estimation};
use crate::storage::{self, EstimationConfig, KeyValueStore, LearningConfig};
use crate::task::Task;

/// Store key of the per-category records.
pub const RECORDS_KEY: &str = "learning/records";
/// Store key of the raw sample log.
pub const SAMPLES_KEY: &str = "learning/history";

/// Summary of what has been learned so far.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningInsights {
    pub categories: Vec<String>,
    pub per_category_accuracy: BTreeMap<String, f64>,
    /// Mean of the category accuracies, 0 when nothing was learned
    pub overall_accuracy: f64,
    pub total_records_learned: usize,
}

#[derive(Debug, Default)]
struct LearningState {
    records: BTreeMap<String, LearningRecord>,
    samples: VecDeque<LearningSample>,
}

/// Owns all learned statistics; mutated only through [`LearningStore::record_actual`].
pub struct LearningStore {
    config: LearningConfig,
    estimator: Estimator,
    state: RwLock<LearningState>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl LearningStore {
    /// Non-persistent store with default constants.
    pub fn in_memory() -> Self {
        Self::new(LearningConfig::default(), EstimationConfig::default())
    }

    pub fn new(config: LearningConfig, estimation: EstimationConfig) -> Self {
        Self {
            config,
            estimator: Estimator::with_config(estimation),
            state: RwLock::new(LearningState::default()),
            store: None,
        }
    }

    /// Restore records and samples from `store` and persist every update back.
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        config: LearningConfig,
        estimation: EstimationConfig,
    ) -> Result<Self, StorageError> {
        let records: BTreeMap<String, LearningRecord> =
            storage::load_json(store.as_ref(), RECORDS_KEY)?.unwrap_or_default();
        let samples: VecDeque<LearningSample> =
            storage::load_json(store.as_ref(), SAMPLES_KEY)?.unwrap_or_default();
        tracing::debug!(categories = records.len(), samples = samples.len(), "learning store loaded");

        let mut this = Self::new(config, estimation);
        this.state = RwLock::new(LearningState { records, samples });
        this.store = Some(store);
        Ok(this)
    }

    /// Fold a completed task's actual time into its category statistics.
    ///
    /// The estimated total is the task's stored estimation, or a fresh
    /// baseline estimate when the task was never estimated.
    pub fn record_actual(&self, task: &Task, actual: &ActualTime) -> Result<LearningRecord, StorageError> {
        let category = category_for(task);
        let estimated_total = task
            .estimation
            .map(|e| e.total)
            .unwrap_or_else(|| self.estimator.estimate_with(task, None).total);
        let now = Utc::now();

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let record = state
            .records
            .entry(category.clone())
            .or_insert_with(|| LearningRecord::initial(category.clone(), now));
        let accuracy = record.observe(estimated_total, actual, self.config.learning_rate, now);
        let updated = record.clone();

        state.samples.push_back(LearningSample {
            task_id: task.id.clone(),
            category: category.clone(),
            estimated_total,
            actual: *actual,
            accuracy,
            recorded_at: now,
        });
        while state.samples.len() > self.config.history_limit {
            state.samples.pop_front();
        }

        tracing::info!(
            category = %category,
            estimated_total,
            actual_total = actual.total(),
            accuracy,
            learned_accuracy = updated.accuracy,
            "recorded actual time"
        );

        if let Some(store) = &self.store {
            storage::save_json(store.as_ref(), RECORDS_KEY, &state.records)?;
            storage::save_json(store.as_ref(), SAMPLES_KEY, &state.samples)?;
        }
        Ok(updated)
    }

    /// Estimate a task using this store's learned statistics.
    pub fn improved_estimate(&self, task: &Task) -> Estimation {
        let record = self.lookup(&category_for(task));
        self.estimator.estimate_with(task, record.as_ref())
    }

    pub fn insights(&self) -> LearningInsights {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let per_category_accuracy: BTreeMap<String, f64> = state
            .records
            .iter()
            .map(|(k, r)| (k.clone(), r.accuracy))
            .collect();
        let overall_accuracy = if per_category_accuracy.is_empty() {
            0.0
        } else {
            per_category_accuracy.values().sum::<f64>() / per_category_accuracy.len() as f64
        };

        LearningInsights {
            categories: state.records.keys().cloned().collect(),
            per_category_accuracy,
            overall_accuracy,
            total_records_learned: state.samples.len(),
        }
    }

    /// Most recent raw samples, newest last.
    pub fn samples(&self) -> Vec<LearningSample> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.samples.iter().cloned().collect()
    }
}

impl LearningLookup for LearningStore {
    fn lookup(&self, category: &str) -> Option<LearningRecord> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.records.get(category).cloned()
    }
}
