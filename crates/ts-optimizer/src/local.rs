//! In-process search backend driving a [`SearchStrategy`].

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use ts_tuner::{Objective, ParameterValue, SearchBackend};
use ts_types::{backend_error, Assignment, Descriptor, TuneError, TuneResult};

use crate::config::TunerConfig;
use crate::search::{Configuration, SearchSpace, SearchStrategy};
use crate::trial::{SearchState, SearchStatus, Trial, TrialResult};

/// Runs trials in the calling thread, one objective call per proposed
/// configuration.
///
/// Parameter values handed out by [`add_parameter`](SearchBackend::add_parameter)
/// read the active trial's configuration; resolving them outside of
/// [`run_search`](SearchBackend::run_search)'s objective calls panics.
pub struct LocalBackend<S: SearchStrategy> {
    config: TunerConfig,
    strategy: S,
    space: SearchSpace,
    current: Arc<RwLock<Option<Configuration>>>,
    trials: Vec<Trial>,
    status: SearchStatus,
}

impl LocalBackend<Box<dyn SearchStrategy>> {
    /// Backend using the strategy named in `config`.
    pub fn from_config(config: TunerConfig) -> TuneResult<Self> {
        let strategy = config.build_strategy();
        Self::new(strategy, config)
    }
}

impl<S: SearchStrategy> LocalBackend<S> {
    pub fn new(strategy: S, config: TunerConfig) -> TuneResult<Self> {
        config.validate()?;
        let status = SearchStatus::new(strategy.name(), config.direction);
        Ok(Self {
            config,
            strategy,
            space: SearchSpace::new(),
            current: Arc::new(RwLock::new(None)),
            trials: Vec::new(),
            status,
        })
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn status(&self) -> &SearchStatus {
        &self.status
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.status.best_trial.as_ref()
    }

    /// The best configuration found, keyed by parameter name.
    pub fn best_configuration(&self) -> Option<&BTreeMap<String, Assignment>> {
        self.best_trial().map(|best| &best.parameters)
    }

    /// Write the best configuration as JSON. Returns `false` when no trial
    /// succeeded and there is nothing to write.
    pub fn save_final_config(&self, path: impl AsRef<Path>) -> TuneResult<bool> {
        let Some(best) = self.best_configuration() else {
            warn!("No successful trial; final configuration not written");
            return Ok(false);
        };
        let json = serde_json::to_string_pretty(best)?;
        std::fs::write(path.as_ref(), json)?;
        info!("Final configuration written to {}", path.as_ref().display());
        Ok(true)
    }

    fn run_trial(&mut self, configuration: Configuration, objective: &mut Objective<'_>) {
        let mut trial = Trial::new(self.trials.len(), self.space.named(&configuration));

        *self.current.write() = Some(configuration.clone());
        trial.mark_running();
        let clock = Instant::now();
        let score = objective();
        let elapsed = clock.elapsed();
        *self.current.write() = None;

        let reported = match score {
            Some(score) if !score.is_nan() => {
                debug!("Trial {} scored {}", trial.trial_number, score);
                trial.mark_completed(TrialResult {
                    trial_id: trial.id,
                    trial_number: trial.trial_number,
                    objective: score,
                    parameters: trial.parameters.clone(),
                    duration_ms: u64::try_from(elapsed.as_millis()).ok(),
                });
                score
            }
            other => {
                let reason = match other {
                    Some(_) => "objective returned NaN",
                    None => "objective returned no score",
                };
                warn!("Trial {} failed: {}", trial.trial_number, reason);
                trial.mark_failed(reason.to_string());
                self.config.direction.worst()
            }
        };

        self.strategy.report(&configuration, reported);
        self.status.record(&trial);
        self.trials.push(trial);
    }
}

impl<S: SearchStrategy> SearchBackend for LocalBackend<S> {
    fn add_parameter(
        &mut self,
        name: &str,
        descriptor: Descriptor,
    ) -> TuneResult<ParameterValue<Assignment>> {
        if self.status.state != SearchState::Pending {
            return Err(TuneError::SessionClosed);
        }
        descriptor.validate(name)?;
        if self.space.contains(name) {
            return Err(TuneError::DuplicateName {
                name: name.to_string(),
            });
        }

        let slot = self.space.push(name, descriptor);
        debug!("Registered `{}` as {} (slot {})", name, descriptor, slot);

        let current = Arc::clone(&self.current);
        let name = name.to_string();
        Ok(ParameterValue::from_fn(move || {
            current
                .read()
                .as_ref()
                .and_then(|configuration| configuration.get(slot).cloned())
                .unwrap_or_else(|| {
                    panic!("parameter `{name}` resolved outside of an active trial")
                })
        }))
    }

    fn run_search(&mut self, objective: &mut Objective<'_>) -> TuneResult<()> {
        if self.status.state != SearchState::Pending {
            return Err(TuneError::SessionClosed);
        }
        self.status.mark_running();
        info!(
            "Starting {} search over {} parameters (test limit {})",
            self.strategy.name(),
            self.space.len(),
            self.config.test_limit
        );

        let started = Instant::now();
        let budget = self.config.stop_after();
        let mut seen: HashSet<Configuration> = HashSet::new();
        let mut duplicate_streak = 0;

        while self.trials.len() < self.config.test_limit {
            if budget.is_some_and(|budget| started.elapsed() >= budget) {
                info!("Search time budget exhausted");
                break;
            }

            let Some(configuration) = self.strategy.suggest(&self.space) else {
                info!("Strategy {} has no further configurations", self.strategy.name());
                break;
            };
            if !self.space.admits(&configuration) {
                let error = backend_error!(
                    "strategy {} proposed an invalid configuration {:?}",
                    self.strategy.name(),
                    configuration
                );
                self.status.mark_failed(error.to_string());
                return Err(error);
            }

            if self.config.no_dups && seen.contains(&configuration) {
                self.status.duplicates_skipped += 1;
                duplicate_streak += 1;
                if duplicate_streak >= self.config.max_duplicate_streak {
                    warn!(
                        "Stopping after {} consecutive duplicate proposals",
                        duplicate_streak
                    );
                    break;
                }
                continue;
            }
            duplicate_streak = 0;
            if self.config.no_dups {
                seen.insert(configuration.clone());
            }

            self.run_trial(configuration, objective);
        }

        self.status.mark_completed();
        match self.best_trial() {
            Some(best) => info!(
                "Search finished: {} trials ({} failed), best objective {} at trial {}",
                self.status.trials_total(),
                self.status.trials_failed,
                best.objective,
                best.trial_number
            ),
            None => warn!(
                "Search finished: {} trials, none succeeded",
                self.status.trials_total()
            ),
        }

        if let Some(path) = &self.config.final_config_path {
            self.save_final_config(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::search::{GridSearch, RandomSearch};
    use crate::trial::{ObjectiveDirection, TrialStatus};
    use ts_types::RawPermutation;

    fn grid_backend(limit: usize) -> LocalBackend<GridSearch> {
        let config = TunerConfig::default().with_test_limit(limit);
        LocalBackend::new(GridSearch::new(), config).unwrap()
    }

    #[test]
    fn values_follow_the_active_trial() {
        let mut backend = grid_backend(100);
        let cat = backend.add_parameter("c", Descriptor::category(3)).unwrap();
        let perm = backend.add_parameter("p", Descriptor::permutation(2)).unwrap();

        let mut seen = Vec::new();
        backend
            .run_search(&mut || {
                seen.push((cat.resolve(), perm.resolve()));
                Some(seen.len() as f64)
            })
            .unwrap();

        assert_eq!(seen.len(), 6);
        assert_eq!(seen[0].0, Assignment::Index(0));
        assert_eq!(
            seen[1].1,
            Assignment::Permutation(RawPermutation::new(vec![1, 0]).unwrap())
        );
        assert_eq!(backend.status().trials_completed, 6);
        assert_eq!(backend.best_trial().unwrap().trial_number, 0);
    }

    #[test]
    #[should_panic(expected = "outside of an active trial")]
    fn resolving_outside_a_trial_panics() {
        let mut backend = grid_backend(10);
        let cat = backend.add_parameter("c", Descriptor::category(3)).unwrap();
        cat.resolve();
    }

    #[test]
    fn failed_trials_are_recorded_and_search_continues() {
        let mut backend = grid_backend(100);
        let cat = backend.add_parameter("c", Descriptor::category(4)).unwrap();

        backend
            .run_search(&mut || match cat.resolve() {
                Assignment::Index(i) if i % 2 == 1 => None,
                Assignment::Index(i) => Some(10.0 - i as f64),
                Assignment::Permutation(_) => None,
            })
            .unwrap();

        let status = backend.status();
        assert_eq!(status.state, SearchState::Completed);
        assert_eq!(status.trials_completed, 2);
        assert_eq!(status.trials_failed, 2);
        assert_eq!(backend.trials()[1].status, TrialStatus::Failed);
        assert_eq!(status.best_trial.as_ref().unwrap().objective, 8.0);
        assert_eq!(
            backend.best_configuration().unwrap()["c"],
            Assignment::Index(2)
        );
    }

    #[test]
    fn test_limit_bounds_the_search() {
        let mut backend = grid_backend(5);
        backend.add_parameter("r", Descriptor::range(50)).unwrap();

        let mut calls = 0;
        backend
            .run_search(&mut || {
                calls += 1;
                Some(1.0)
            })
            .unwrap();
        assert_eq!(calls, 5);
        assert_eq!(backend.trials().len(), 5);
    }

    #[test]
    fn duplicate_proposals_are_skipped() {
        let config = TunerConfig::default()
            .with_test_limit(50)
            .with_seed(3);
        let config = TunerConfig {
            max_duplicate_streak: 200,
            ..config
        };
        let mut backend = LocalBackend::new(RandomSearch::new(config.seed), config).unwrap();
        let cat = backend.add_parameter("c", Descriptor::category(3)).unwrap();

        let mut seen = Vec::new();
        backend
            .run_search(&mut || {
                seen.push(cat.resolve());
                Some(0.0)
            })
            .unwrap();

        // only three distinct configurations exist
        assert_eq!(seen.len(), 3);
        let distinct: HashSet<_> = seen.into_iter().collect();
        assert_eq!(distinct.len(), 3);
        assert!(backend.status().duplicates_skipped >= 200);
    }

    #[test]
    fn duplicates_allowed_when_configured() {
        let config = TunerConfig::default()
            .with_test_limit(20)
            .with_no_dups(false)
            .with_seed(3);
        let mut backend = LocalBackend::new(RandomSearch::new(config.seed), config).unwrap();
        backend.add_parameter("c", Descriptor::category(2)).unwrap();

        backend.run_search(&mut || Some(0.0)).unwrap();
        assert_eq!(backend.trials().len(), 20);
        assert_eq!(backend.status().duplicates_skipped, 0);
    }

    #[test]
    fn nan_scores_count_as_failures() {
        let mut backend = grid_backend(10);
        backend.add_parameter("c", Descriptor::category(2)).unwrap();
        backend.run_search(&mut || Some(f64::NAN)).unwrap();
        assert_eq!(backend.status().trials_failed, 2);
        assert!(backend.best_trial().is_none());
    }

    #[test]
    fn registration_rules() {
        let mut backend = grid_backend(10);
        backend.add_parameter("x", Descriptor::range(3)).unwrap();
        assert!(matches!(
            backend.add_parameter("x", Descriptor::range(3)),
            Err(TuneError::DuplicateName { .. })
        ));
        assert!(matches!(
            backend.add_parameter("y", Descriptor::category(0)),
            Err(TuneError::ZeroCardinality { .. })
        ));

        backend.run_search(&mut || Some(1.0)).unwrap();
        assert!(matches!(
            backend.add_parameter("z", Descriptor::range(3)),
            Err(TuneError::SessionClosed)
        ));
        assert!(matches!(
            backend.run_search(&mut || Some(1.0)),
            Err(TuneError::SessionClosed)
        ));
    }

    #[test]
    fn maximize_keeps_highest_score() {
        let config =
            TunerConfig::new(StrategyKind::Grid).with_direction(ObjectiveDirection::Maximize);
        let mut backend = LocalBackend::from_config(config).unwrap();
        let r = backend.add_parameter("r", Descriptor::range(4)).unwrap();

        backend
            .run_search(&mut || r.resolve().as_index().map(|i| i as f64))
            .unwrap();
        assert_eq!(backend.best_trial().unwrap().objective, 3.0);
        assert_eq!(backend.status().strategy, "grid");
    }

    #[test]
    fn final_configuration_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final_config.json");
        let config = TunerConfig::new(StrategyKind::Grid).with_final_config_path(&path);
        let mut backend = LocalBackend::from_config(config).unwrap();
        let r = backend.add_parameter("r", Descriptor::range(3)).unwrap();

        backend
            .run_search(&mut || r.resolve().as_index().map(|i| (i as f64 - 1.0).abs()))
            .unwrap();

        let written: BTreeMap<String, Assignment> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["r"], Assignment::Index(1));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = TunerConfig::default().with_test_limit(0);
        assert!(LocalBackend::new(GridSearch::new(), config).is_err());

        let config = TunerConfig {
            stop_after_secs: Some(1e30),
            ..TunerConfig::default()
        };
        assert!(matches!(
            LocalBackend::new(GridSearch::new(), config),
            Err(TuneError::Config(_))
        ));
    }
}
