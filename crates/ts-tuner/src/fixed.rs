//! A backend that replays one fixed configuration.
//!
//! Useful for re-running a kernel under the best configuration a search
//! produced (see `LocalBackend`'s final-configuration export in
//! `ts-optimizer`), and as a deterministic stand-in for a real optimizer.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ts_types::{backend_error, Assignment, Descriptor, RawPermutation, TuneError, TuneResult};

use crate::backend::{Objective, SearchBackend};
use crate::value::ParameterValue;

/// Replays a fixed name → assignment map.
///
/// Parameters without an explicit assignment get the first category, the
/// first range index, or the identity permutation. Assignments can be changed
/// between resolutions with [`set`](Self::set); the objective is invoked
/// `trials` times (once by default).
#[derive(Debug)]
pub struct FixedBackend {
    assignments: Arc<RwLock<HashMap<String, Assignment>>>,
    space: Vec<(String, Descriptor)>,
    trials: usize,
    scores: Vec<Option<f64>>,
}

impl FixedBackend {
    pub fn new() -> Self {
        Self {
            assignments: Arc::new(RwLock::new(HashMap::new())),
            space: Vec::new(),
            trials: 1,
            scores: Vec::new(),
        }
    }

    /// Load a configuration written by a previous search (a JSON object
    /// mapping parameter names to indices or index arrays).
    pub fn from_json_str(json: &str) -> TuneResult<Self> {
        let assignments: HashMap<String, Assignment> = serde_json::from_str(json)?;
        let backend = Self::new();
        *backend.assignments.write() = assignments;
        Ok(backend)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> TuneResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn with_assignment(self, name: impl Into<String>, assignment: Assignment) -> Self {
        self.assignments.write().insert(name.into(), assignment);
        self
    }

    pub fn with_index(self, name: impl Into<String>, index: usize) -> Self {
        self.with_assignment(name, Assignment::Index(index))
    }

    pub fn with_permutation(self, name: impl Into<String>, permutation: RawPermutation) -> Self {
        self.with_assignment(name, Assignment::Permutation(permutation))
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    /// Change the assignment of an already registered parameter.
    pub fn set(&self, name: &str, assignment: Assignment) -> TuneResult<()> {
        let descriptor = self
            .space
            .iter()
            .find(|(registered, _)| registered == name)
            .map(|(_, descriptor)| descriptor)
            .ok_or_else(|| backend_error!("parameter `{}` is not registered", name))?;
        if !descriptor.admits(&assignment) {
            return Err(backend_error!(
                "assignment {} is not valid for `{}` ({})",
                assignment,
                name,
                descriptor
            ));
        }
        self.assignments.write().insert(name.to_string(), assignment);
        Ok(())
    }

    /// Scores returned by the objective, one per trial.
    pub fn scores(&self) -> &[Option<f64>] {
        &self.scores
    }

    pub fn failed_trials(&self) -> usize {
        self.scores.iter().filter(|s| s.is_none()).count()
    }

    pub fn space(&self) -> &[(String, Descriptor)] {
        &self.space
    }

    fn default_assignment(descriptor: &Descriptor) -> Assignment {
        match descriptor {
            Descriptor::Permutation(p) => {
                Assignment::Permutation(RawPermutation::identity(p.count))
            }
            Descriptor::Category(_) | Descriptor::Range(_) => Assignment::Index(0),
        }
    }
}

impl Default for FixedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchBackend for FixedBackend {
    fn add_parameter(
        &mut self,
        name: &str,
        descriptor: Descriptor,
    ) -> TuneResult<ParameterValue<Assignment>> {
        descriptor.validate(name)?;
        if self.space.iter().any(|(registered, _)| registered == name) {
            return Err(TuneError::DuplicateName {
                name: name.to_string(),
            });
        }

        {
            let mut assignments = self.assignments.write();
            match assignments.get(name) {
                Some(assignment) if !descriptor.admits(assignment) => {
                    return Err(backend_error!(
                        "fixed assignment {} is not valid for `{}` ({})",
                        assignment,
                        name,
                        descriptor
                    ));
                }
                Some(_) => {}
                None => {
                    assignments.insert(name.to_string(), Self::default_assignment(&descriptor));
                }
            }
        }
        self.space.push((name.to_string(), descriptor));

        let assignments = Arc::clone(&self.assignments);
        let name = name.to_string();
        let fallback = Self::default_assignment(&descriptor);
        Ok(ParameterValue::from_fn(move || {
            assignments
                .read()
                .get(&name)
                .cloned()
                .unwrap_or_else(|| fallback.clone())
        }))
    }

    fn run_search(&mut self, objective: &mut Objective<'_>) -> TuneResult<()> {
        for trial in 0..self.trials {
            let score = objective();
            match score {
                Some(score) => debug!("Fixed trial {} scored {}", trial, score),
                None => warn!("Fixed trial {} failed", trial),
            }
            self.scores.push(score);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_alternative() {
        let mut backend = FixedBackend::new();
        let category = backend.add_parameter("c", Descriptor::category(3)).unwrap();
        let perm = backend.add_parameter("p", Descriptor::permutation(3)).unwrap();

        assert_eq!(category.resolve(), Assignment::Index(0));
        assert_eq!(
            perm.resolve(),
            Assignment::Permutation(RawPermutation::identity(3))
        );
    }

    #[test]
    fn preset_assignments_are_validated() {
        let mut backend = FixedBackend::new().with_index("c", 5);
        assert!(backend.add_parameter("c", Descriptor::category(3)).is_err());

        let mut backend = FixedBackend::new().with_index("c", 2);
        let category = backend.add_parameter("c", Descriptor::category(3)).unwrap();
        assert_eq!(category.resolve(), Assignment::Index(2));
    }

    #[test]
    fn set_updates_live_values() {
        let mut backend = FixedBackend::new();
        let range = backend.add_parameter("r", Descriptor::range(4)).unwrap();

        backend.set("r", Assignment::Index(3)).unwrap();
        assert_eq!(range.resolve(), Assignment::Index(3));

        assert!(backend.set("r", Assignment::Index(4)).is_err());
        assert!(backend.set("missing", Assignment::Index(0)).is_err());
    }

    #[test]
    fn rejects_duplicates_and_empty_descriptors() {
        let mut backend = FixedBackend::new();
        backend.add_parameter("x", Descriptor::category(2)).unwrap();
        assert!(matches!(
            backend.add_parameter("x", Descriptor::category(2)),
            Err(TuneError::DuplicateName { .. })
        ));
        assert!(matches!(
            backend.add_parameter("y", Descriptor::range(0)),
            Err(TuneError::ZeroCardinality { .. })
        ));
    }

    #[test]
    fn loads_saved_configuration() {
        let mut backend =
            FixedBackend::from_json_str(r#"{"block": 2, "order": [1, 2, 0]}"#).unwrap();
        let block = backend.add_parameter("block", Descriptor::range(5)).unwrap();
        let order = backend.add_parameter("order", Descriptor::permutation(3)).unwrap();

        assert_eq!(block.resolve(), Assignment::Index(2));
        assert_eq!(
            order.resolve().into_permutation().unwrap().as_slice(),
            &[1, 2, 0]
        );
    }

    #[test]
    fn runs_requested_number_of_trials() {
        let mut backend = FixedBackend::new().with_trials(2);
        let mut calls = 0;
        backend
            .run_search(&mut || {
                calls += 1;
                None
            })
            .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(backend.failed_trials(), 2);
    }
}
