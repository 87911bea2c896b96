//! Deferred parameter values.

use std::fmt;
use std::sync::Arc;

/// A value that is only known once a search backend has fixed the current
/// trial's assignment.
///
/// Every call to [`resolve`](Self::resolve) re-runs the underlying resolver,
/// so the result always reflects the trial that is active at that moment.
/// Clones share the resolver.
pub struct ParameterValue<T> {
    resolver: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T: 'static> ParameterValue<T> {
    /// Wrap an arbitrary deferred expression, e.g. one that resolves other
    /// parameters.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            resolver: Arc::new(f),
        }
    }

    /// A value that ignores trial state altogether.
    pub fn constant(value: T) -> Self
    where
        T: Clone + Send + Sync,
    {
        Self::from_fn(move || value.clone())
    }

    /// Evaluate against the current trial.
    ///
    /// Only meaningful while a backend is running a trial; what happens
    /// outside of one is up to the backend (the bundled backends panic).
    pub fn resolve(&self) -> T {
        (self.resolver)()
    }

    /// Lazily apply `f` to the resolved value.
    pub fn transform<U, F>(self, f: F) -> ParameterValue<U>
    where
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        ParameterValue::from_fn(move || f(self.resolve()))
    }

    /// Like [`transform`](Self::transform) for functions that themselves
    /// produce a deferred value; resolution performs both steps.
    pub fn transform_flatten<U, F>(self, f: F) -> ParameterValue<U>
    where
        U: 'static,
        F: Fn(T) -> ParameterValue<U> + Send + Sync + 'static,
    {
        ParameterValue::from_fn(move || f(self.resolve()).resolve())
    }

    /// Promote into a wider type, e.g. a `ParameterValue<u8>` taking part in
    /// a choice over `u32`.
    pub fn convert<U>(self) -> ParameterValue<U>
    where
        U: From<T> + 'static,
    {
        self.transform(U::from)
    }
}

impl<T> Clone for ParameterValue<T> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> From<T> for ParameterValue<T> {
    fn from(value: T) -> Self {
        Self::constant(value)
    }
}

impl<T> fmt::Debug for ParameterValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterValue")
            .field("type", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}
