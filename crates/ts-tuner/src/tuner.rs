//! Typed parameter-space declaration on top of a [`SearchBackend`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};
use ts_types::{Assignment, Descriptor, TuneError, TuneResult};

use crate::backend::{index_of, permutation_of, SearchBackend};
use crate::range::{RangeValue, UnitStep};
use crate::value::ParameterValue;

/// Name under which a parameter is registered with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamName {
    Explicit(String),
    /// Take the next name from the session's [`NameCounter`]. Auto names
    /// depend on declaration order, so sessions whose results must be
    /// comparable across runs should name every parameter.
    Auto,
}

impl From<&str> for ParamName {
    fn from(name: &str) -> Self {
        Self::Explicit(name.to_string())
    }
}

impl From<String> for ParamName {
    fn from(name: String) -> Self {
        Self::Explicit(name)
    }
}

impl From<&String> for ParamName {
    fn from(name: &String) -> Self {
        Self::Explicit(name.clone())
    }
}

/// Sequential decimal names for unnamed declarations: "1", "2", ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCounter {
    next: u64,
}

impl NameCounter {
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    pub fn next_name(&mut self) -> String {
        let name = self.next.to_string();
        self.next += 1;
        name
    }
}

impl Default for NameCounter {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// Bookkeeping for one declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredParameter {
    pub name: String,
    pub descriptor: Descriptor,
    /// Number of normalized alternatives stored for choice and permutation
    /// forms; `None` for ranges.
    pub stored_choices: Option<usize>,
}

/// Declares a tunable parameter space against a search backend, then hands
/// control to it with [`tune`](Self::tune).
///
/// Each declaration registers exactly one descriptor and returns one
/// [`ParameterValue`]. Choice lists are homogeneous: build them with
/// [`params!`](crate::params), which lifts constants and passes deferred
/// values through.
///
/// ```ignore
/// let mut tuner = Tuner::new(backend);
/// let block = tuner.mapped_range("block", |i: u32| 1usize << i, 1, 6)?;
/// let layout = tuner.choice("layout", params![Layout::RowMajor, Layout::ColMajor])?;
/// tuner.tune(|| measure(block.resolve(), layout.resolve()))?;
/// ```
pub struct Tuner<B: SearchBackend> {
    backend: B,
    counter: NameCounter,
    names: HashSet<String>,
    declared: Vec<DeclaredParameter>,
    sealed: bool,
}

impl<B: SearchBackend> Tuner<B> {
    pub fn new(backend: B) -> Self {
        Self::with_counter(backend, NameCounter::default())
    }

    pub fn with_counter(backend: B, counter: NameCounter) -> Self {
        Self {
            backend,
            counter,
            names: HashSet::new(),
            declared: Vec::new(),
            sealed: false,
        }
    }

    // -- Declarations -------------------------------------------------------

    /// Pick one of `values`. Resolves to the alternative the backend chose
    /// for the current trial.
    pub fn choice<T, I>(
        &mut self,
        name: impl Into<ParamName>,
        values: I,
    ) -> TuneResult<ParameterValue<T>>
    where
        T: 'static,
        I: IntoIterator<Item = ParameterValue<T>>,
    {
        let name = self.claim_name(name.into())?;
        let stored: Vec<ParameterValue<T>> = values.into_iter().collect();
        if stored.is_empty() {
            return Err(TuneError::EmptyChoice { name });
        }

        let descriptor = Descriptor::category(stored.len());
        let raw = self.register(name.clone(), descriptor, Some(stored.len()))?;
        Ok(index_of(name, raw).transform(move |chosen| stored[chosen].resolve()))
    }

    /// Arrange `values` in the order the backend chose for the current trial.
    pub fn permutation<T, const N: usize>(
        &mut self,
        name: impl Into<ParamName>,
        values: [ParameterValue<T>; N],
    ) -> TuneResult<ParameterValue<[T; N]>>
    where
        T: 'static,
    {
        let name = self.claim_name(name.into())?;
        if N == 0 {
            return Err(TuneError::EmptyChoice { name });
        }

        let raw = self.register(name.clone(), Descriptor::permutation(N), Some(N))?;
        Ok(permutation_of(name, N, raw)
            .transform(move |order| std::array::from_fn(|k| values[order[k]].resolve())))
    }

    /// Like [`permutation`](Self::permutation), but folds the arranged values
    /// into one result with `combiner`.
    pub fn mapped_permutation<T, U, F, const N: usize>(
        &mut self,
        name: impl Into<ParamName>,
        combiner: F,
        values: [ParameterValue<T>; N],
    ) -> TuneResult<ParameterValue<U>>
    where
        T: 'static,
        U: 'static,
        F: Fn([T; N]) -> U + Send + Sync + 'static,
    {
        Ok(self.permutation(name, values)?.transform(combiner))
    }

    /// `begin, begin + 1, ...` up to but excluding `end`.
    pub fn range<T: UnitStep>(
        &mut self,
        name: impl Into<ParamName>,
        begin: T,
        end: T,
    ) -> TuneResult<ParameterValue<T>> {
        self.range_step(name, begin, end, T::unit())
    }

    /// `begin + i * step` for `i` in `[0, ⌈(end − begin) / step⌉)`.
    pub fn range_step<T: RangeValue>(
        &mut self,
        name: impl Into<ParamName>,
        begin: T,
        end: T,
        step: T,
    ) -> TuneResult<ParameterValue<T>> {
        let name = self.claim_name(name.into())?;
        let size = T::steps_between(&begin, &end, &step).map_err(|e| TuneError::InvalidStep {
            name: name.clone(),
            message: e.to_string(),
        })?;
        if size == 0 {
            return Err(TuneError::EmptyRange { name });
        }

        let raw = self.register(name.clone(), Descriptor::range(size), None)?;
        Ok(index_of(name, raw).transform(move |chosen| T::nth(&begin, chosen, &step)))
    }

    /// A unit-step range whose values are passed through `f`, e.g.
    /// `|i| 1 << i` for power-of-two block sizes.
    pub fn mapped_range<T, U, F>(
        &mut self,
        name: impl Into<ParamName>,
        f: F,
        begin: T,
        end: T,
    ) -> TuneResult<ParameterValue<U>>
    where
        T: UnitStep,
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.mapped_range_step(name, f, begin, end, T::unit())
    }

    pub fn mapped_range_step<T, U, F>(
        &mut self,
        name: impl Into<ParamName>,
        f: F,
        begin: T,
        end: T,
        step: T,
    ) -> TuneResult<ParameterValue<U>>
    where
        T: RangeValue,
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Ok(self.range_step(name, begin, end, step)?.transform(f))
    }

    // -- Search -------------------------------------------------------------

    /// Close the declaration phase and run the backend's search.
    ///
    /// `objective` is called once per trial and returns a score (lower is
    /// better unless the backend is configured otherwise) or `None` for a
    /// configuration that could not be measured.
    pub fn tune<F>(&mut self, mut objective: F) -> TuneResult<()>
    where
        F: FnMut() -> Option<f64>,
    {
        if self.sealed {
            return Err(TuneError::SessionClosed);
        }
        self.sealed = true;

        info!("Tuning {} parameters", self.declared.len());
        self.backend.run_search(&mut objective)
    }

    // -- Accessors ----------------------------------------------------------

    pub fn declared(&self) -> &[DeclaredParameter] {
        &self.declared
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    // -- Internals ----------------------------------------------------------

    fn claim_name(&mut self, name: ParamName) -> TuneResult<String> {
        if self.sealed {
            return Err(TuneError::SessionClosed);
        }
        let name = match name {
            ParamName::Explicit(name) => name,
            ParamName::Auto => self.counter.next_name(),
        };
        if self.names.contains(&name) {
            return Err(TuneError::DuplicateName { name });
        }
        Ok(name)
    }

    fn register(
        &mut self,
        name: String,
        descriptor: Descriptor,
        stored_choices: Option<usize>,
    ) -> TuneResult<ParameterValue<Assignment>> {
        descriptor.validate(&name)?;
        let raw = self.backend.add_parameter(&name, descriptor)?;
        debug!("Declared parameter `{}` as {}", name, descriptor);

        self.names.insert(name.clone());
        self.declared.push(DeclaredParameter {
            name,
            descriptor,
            stored_choices,
        });
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::FixedBackend;
    use crate::params;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use ts_types::RawPermutation;

    fn tuner() -> Tuner<FixedBackend> {
        Tuner::new(FixedBackend::new())
    }

    fn pick(tuner: &Tuner<FixedBackend>, name: &str, index: usize) {
        tuner
            .backend()
            .set(name, Assignment::Index(index))
            .unwrap();
    }

    fn order(tuner: &Tuner<FixedBackend>, name: &str, perm: Vec<usize>) {
        let perm = RawPermutation::new(perm).unwrap();
        tuner
            .backend()
            .set(name, Assignment::Permutation(perm))
            .unwrap();
    }

    #[test]
    fn choice_resolves_selected_constant() {
        let mut tuner = tuner();
        let mode = tuner.choice("mode", params![10, 20, 30]).unwrap();

        pick(&tuner, "mode", 1);
        assert_eq!(mode.resolve(), 20);

        for (i, expected) in [10, 20, 30].into_iter().enumerate() {
            pick(&tuner, "mode", i);
            assert_eq!(mode.resolve(), expected);
        }
        assert_eq!(tuner.declared()[0].descriptor, Descriptor::category(3));
    }

    #[test]
    fn choice_mixes_constants_and_deferred_values() {
        let mut tuner = tuner();
        let block = tuner.range("block", 4usize, 8).unwrap();
        let scaled = block.clone().transform(|b| b * 10);
        let tile = tuner.choice("tile", params![scaled, 1usize]).unwrap();

        pick(&tuner, "block", 2);
        pick(&tuner, "tile", 0);
        assert_eq!(tile.resolve(), 60);

        pick(&tuner, "tile", 1);
        assert_eq!(tile.resolve(), 1);
    }

    #[test]
    fn choice_of_converted_deferred_values() {
        let mut tuner = tuner();
        let narrow = tuner.range("narrow", 0u8, 4).unwrap();
        let wide = tuner
            .choice("wide", params![narrow.convert::<u64>(), 1_000u64])
            .unwrap();

        pick(&tuner, "narrow", 3);
        pick(&tuner, "wide", 0);
        assert_eq!(wide.resolve(), 3u64);
    }

    #[test]
    fn permutation_rearranges_values() {
        let mut tuner = tuner();
        let ord = tuner.permutation("ord", params!['A', 'B', 'C']).unwrap();

        order(&tuner, "ord", vec![2, 0, 1]);
        assert_eq!(ord.resolve(), ['C', 'A', 'B']);

        order(&tuner, "ord", vec![0, 1, 2]);
        assert_eq!(ord.resolve(), ['A', 'B', 'C']);
        assert_eq!(tuner.declared()[0].descriptor, Descriptor::permutation(3));
    }

    #[test]
    fn mapped_permutation_combines_in_permuted_order() {
        let mut tuner = tuner();
        let joined = tuner
            .mapped_permutation(
                "loops",
                |parts: [String; 3]| parts.concat(),
                params!["i".to_string(), "j".to_string(), "k".to_string()],
            )
            .unwrap();

        order(&tuner, "loops", vec![1, 2, 0]);
        assert_eq!(joined.resolve(), "jki");
    }

    #[test]
    fn range_maps_index_to_value() {
        let mut tuner = tuner();
        let stride = tuner.range_step("stride", 2i64, 11, 3).unwrap();
        assert_eq!(tuner.declared()[0].descriptor, Descriptor::range(3));

        pick(&tuner, "stride", 0);
        assert_eq!(stride.resolve(), 2);
        pick(&tuner, "stride", 2);
        assert_eq!(stride.resolve(), 8);
    }

    #[test]
    fn float_range_starts_exactly_at_begin() {
        let mut tuner = tuner();
        let ratio = tuner.range_step("ratio", 0.1f64, 1.0, 0.2).unwrap();
        assert_eq!(tuner.declared()[0].descriptor, Descriptor::range(5));

        pick(&tuner, "ratio", 0);
        assert_eq!(ratio.resolve(), 0.1);
    }

    #[test]
    fn mapped_range_applies_function() {
        let mut tuner = tuner();
        let block = tuner.mapped_range("blk", |i: u32| 1u32 << i, 1, 6).unwrap();
        assert_eq!(tuner.declared()[0].descriptor, Descriptor::range(5));

        pick(&tuner, "blk", 3);
        assert_eq!(block.resolve(), 16);
    }

    #[test]
    fn unnamed_declarations_get_sequential_names() {
        let mut tuner = tuner();
        tuner.choice(ParamName::Auto, params![1, 2]).unwrap();
        tuner.range(ParamName::Auto, 0, 3).unwrap();
        tuner.choice("named", params![true, false]).unwrap();
        tuner.range(ParamName::Auto, 0, 3).unwrap();

        let names: Vec<&str> = tuner.declared().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["1", "2", "named", "3"]);
    }

    #[test]
    fn injected_counter_is_used() {
        let mut tuner = Tuner::with_counter(FixedBackend::new(), NameCounter::starting_at(40));
        tuner.range(ParamName::Auto, 0, 2).unwrap();
        assert_eq!(tuner.declared()[0].name, "40");
    }

    #[test]
    fn declaration_errors_are_reported() {
        let mut tuner = tuner();
        let empty: Vec<ParameterValue<i32>> = Vec::new();
        assert!(matches!(
            tuner.choice("none", empty),
            Err(TuneError::EmptyChoice { .. })
        ));
        let no_values: [ParameterValue<i32>; 0] = [];
        assert!(matches!(
            tuner.permutation("none", no_values),
            Err(TuneError::EmptyChoice { .. })
        ));
        assert!(matches!(
            tuner.range("flat", 5, 5),
            Err(TuneError::EmptyRange { .. })
        ));
        assert!(matches!(
            tuner.range_step("back", 0, 5, -1),
            Err(TuneError::InvalidStep { .. })
        ));

        tuner.range("x", 0, 2).unwrap();
        assert!(matches!(
            tuner.choice("x", params![1]),
            Err(TuneError::DuplicateName { .. })
        ));
        assert_eq!(tuner.declared().len(), 1);
    }

    #[test]
    fn degenerate_range_has_one_value() {
        let mut tuner = tuner();
        let only = tuner.range("only", 7, 8).unwrap();
        assert_eq!(tuner.declared()[0].descriptor, Descriptor::range(1));
        assert_eq!(only.resolve(), 7);
    }

    #[test]
    fn tune_seals_the_session() {
        let mut tuner = tuner();
        let mode = tuner.choice("mode", params![10, 20, 30]).unwrap();
        pick(&tuner, "mode", 2);

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_objective = Arc::clone(&seen);
        tuner
            .tune(|| {
                seen_in_objective.store(mode.resolve(), Ordering::SeqCst);
                Some(1.0)
            })
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 30);
        assert!(tuner.is_sealed());

        assert!(matches!(
            tuner.range("late", 0, 2),
            Err(TuneError::SessionClosed)
        ));
        assert!(matches!(tuner.tune(|| Some(0.0)), Err(TuneError::SessionClosed)));
    }

    #[test]
    fn failed_trials_do_not_abort_tuning() {
        let mut tuner = Tuner::new(FixedBackend::new().with_trials(3));
        tuner.range("x", 0, 4).unwrap();

        let mut calls = 0;
        tuner
            .tune(|| {
                calls += 1;
                (calls != 2).then_some(calls as f64)
            })
            .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(tuner.backend().failed_trials(), 1);
        assert_eq!(tuner.backend().scores(), &[Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn boxed_backends_plug_in() {
        let backend: Box<dyn SearchBackend> = Box::new(FixedBackend::new());
        let mut tuner = Tuner::new(backend);
        let value = tuner.choice("v", params!["a", "b"]).unwrap();
        assert_eq!(value.resolve(), "a");
    }
}
