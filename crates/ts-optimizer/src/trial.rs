//! Trial tracking and search run management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_types::Assignment;
use uuid::Uuid;

/// Unique search run identifier.
pub type SearchId = Uuid;

/// Whether we are maximizing or minimizing the objective.
///
/// Objectives usually report run times, so lower is better by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    Maximize,
    #[default]
    Minimize,
}

impl ObjectiveDirection {
    /// Whether `candidate` strictly improves on `incumbent`.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }

    /// The score a failed trial is reported with.
    pub fn worst(self) -> f64 {
        match self {
            Self::Maximize => f64::NEG_INFINITY,
            Self::Minimize => f64::INFINITY,
        }
    }
}

/// Lifecycle state for a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Aggregate status of a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStatus {
    pub id: SearchId,
    pub strategy: String,
    pub direction: ObjectiveDirection,
    pub state: SearchState,
    pub trials_completed: usize,
    pub trials_failed: usize,
    /// Proposals skipped because the configuration was already evaluated.
    pub duplicates_skipped: usize,
    pub best_trial: Option<TrialResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SearchStatus {
    pub fn new(strategy: impl Into<String>, direction: ObjectiveDirection) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy: strategy.into(),
            direction,
            state: SearchState::Pending,
            trials_completed: 0,
            trials_failed: 0,
            duplicates_skipped: 0,
            best_trial: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = SearchState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = SearchState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = SearchState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn trials_total(&self) -> usize {
        self.trials_completed + self.trials_failed
    }

    /// Count a finished trial and keep the best result.
    pub fn record(&mut self, trial: &Trial) {
        match (&trial.status, &trial.result) {
            (TrialStatus::Completed, Some(result)) => {
                self.trials_completed += 1;
                self.update_best(result);
            }
            (TrialStatus::Failed, _) => self.trials_failed += 1,
            _ => {}
        }
    }

    /// Update the best trial if `result` improves on the current best.
    pub fn update_best(&mut self, result: &TrialResult) {
        let improves = match &self.best_trial {
            None => true,
            Some(current_best) => self
                .direction
                .is_better(result.objective, current_best.objective),
        };
        if improves {
            self.best_trial = Some(result.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Individual trial
// ---------------------------------------------------------------------------

/// A single trial: one configuration and one objective evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub trial_number: usize,
    pub parameters: BTreeMap<String, Assignment>,
    pub status: TrialStatus,
    pub result: Option<TrialResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(trial_number: usize, parameters: BTreeMap<String, Assignment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trial_number,
            parameters,
            status: TrialStatus::Pending,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: TrialResult) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Result of a single successful trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    pub trial_number: usize,
    pub objective: f64,
    pub parameters: BTreeMap<String, Assignment>,
    /// Wall-clock time spent in the objective.
    pub duration_ms: Option<u64>,
}
