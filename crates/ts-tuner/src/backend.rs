//! The contract a concrete search engine implements.

use ts_types::{Assignment, Descriptor, RawPermutation, TuneResult};

use crate::value::ParameterValue;

/// Objective invoked once per trial. `None` marks the trial as failed.
pub type Objective<'a> = dyn FnMut() -> Option<f64> + 'a;

/// Core search backend interface.
///
/// Backends only ever deal with the primitive [`Descriptor`] kinds and raw
/// [`Assignment`]s; typed choices, ranges and derived values are layered on
/// top by [`crate::Tuner`].
pub trait SearchBackend {
    /// Register `descriptor` under `name`.
    ///
    /// The returned value resolves to the current trial's assignment for this
    /// descriptor: an [`Assignment::Index`] for categories and ranges, an
    /// [`Assignment::Permutation`] of matching length for permutations.
    /// Implementations reject duplicate names and zero-cardinality
    /// descriptors.
    fn add_parameter(
        &mut self,
        name: &str,
        descriptor: Descriptor,
    ) -> TuneResult<ParameterValue<Assignment>>;

    /// Drive the search to completion.
    ///
    /// Every registered descriptor's assignment is fixed before `objective`
    /// is called and stays fixed until it returns. An objective returning
    /// `None` is a failed trial, not an error: the search goes on.
    fn run_search(&mut self, objective: &mut Objective<'_>) -> TuneResult<()>;
}

impl<B: SearchBackend + ?Sized> SearchBackend for Box<B> {
    fn add_parameter(
        &mut self,
        name: &str,
        descriptor: Descriptor,
    ) -> TuneResult<ParameterValue<Assignment>> {
        (**self).add_parameter(name, descriptor)
    }

    fn run_search(&mut self, objective: &mut Objective<'_>) -> TuneResult<()> {
        (**self).run_search(objective)
    }
}

/// Narrow a category or range assignment to its index.
///
/// # Panics
///
/// On resolution, if the backend hands out a permutation for an index
/// descriptor.
pub(crate) fn index_of(name: String, raw: ParameterValue<Assignment>) -> ParameterValue<usize> {
    raw.transform(move |assignment| match assignment {
        Assignment::Index(i) => i,
        Assignment::Permutation(p) => panic!(
            "backend produced permutation {:?} for index parameter `{name}`",
            p.as_slice()
        ),
    })
}

/// Narrow a permutation assignment to the raw permutation.
///
/// # Panics
///
/// On resolution, if the backend hands out an index, or a permutation of the
/// wrong length.
pub(crate) fn permutation_of(
    name: String,
    count: usize,
    raw: ParameterValue<Assignment>,
) -> ParameterValue<RawPermutation> {
    raw.transform(move |assignment| match assignment {
        Assignment::Permutation(p) if p.len() == count => p,
        other => panic!(
            "backend produced {other} for permutation parameter `{name}` of {count} elements"
        ),
    })
}
