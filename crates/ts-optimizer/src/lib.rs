//! # ts-optimizer
//!
//! Search strategies and an in-process [`SearchBackend`](ts_tuner::SearchBackend)
//! for `ts-tuner`.
//!
//! Provides the search space model, grid/random/adaptive strategies, trial
//! tracking, and [`LocalBackend`], which evaluates the objective once per
//! proposed configuration and can export the best configuration for replay
//! with [`FixedBackend`](ts_tuner::FixedBackend).

mod config;
mod local;
mod search;
mod trial;

pub use config::{StrategyKind, TunerConfig};
pub use local::LocalBackend;
pub use search::{
    AdaptiveSearch, Configuration, GridSearch, ParameterDef, RandomSearch, SearchSpace,
    SearchStrategy,
};
pub use trial::{
    ObjectiveDirection, SearchId, SearchState, SearchStatus, Trial, TrialResult, TrialStatus,
};
