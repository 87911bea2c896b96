//! # ts-tuner
//!
//! Declares a tunable parameter space and resolves it trial by trial.
//!
//! A [`Tuner`] turns typed declarations (choices, permutations, ranges and
//! their mapped variants) into the three primitive descriptors a
//! [`SearchBackend`] understands, and hands back [`ParameterValue`]s that
//! resolve against whatever assignment the backend has fixed for the current
//! trial.

mod backend;
mod fixed;
mod range;
mod tuner;
mod value;

pub use backend::{Objective, SearchBackend};
pub use fixed::FixedBackend;
pub use range::{RangeValue, StepError, UnitStep};
pub use tuner::{DeclaredParameter, NameCounter, ParamName, Tuner};
pub use value::ParameterValue;

/// Normalize a list of alternatives into `[ParameterValue<T>; N]`.
///
/// Constants are lifted with [`ParameterValue::constant`]; values that are
/// already deferred are passed through unchanged. All elements must share one
/// element type `T`; promote the odd one out with `T::from(..)` or
/// [`ParameterValue::convert`].
///
/// ```ignore
/// let block = tuner.mapped_range("block", |i: u32| 1usize << i, 1, 6)?;
/// let tile = tuner.choice("tile", params![block.clone(), 1usize])?;
/// ```
#[macro_export]
macro_rules! params {
    ($($value:expr),* $(,)?) => {
        [$(
            match $value {
                value => {
                    #[allow(unused_imports)]
                    use $crate::__private::{ConstantKind as _, DeferredKind as _};
                    (&value).choice_kind().lift(value)
                }
            }
        ),*]
    };
}

// Method resolution picks `DeferredKind` for a `ParameterValue<T>` operand
// (no autoref needed) and falls back to `ConstantKind` for anything else.
#[doc(hidden)]
pub mod __private {
    use crate::ParameterValue;

    pub struct DeferredTag;
    pub struct ConstantTag;

    pub trait DeferredKind {
        fn choice_kind(&self) -> DeferredTag {
            DeferredTag
        }
    }

    impl<T> DeferredKind for ParameterValue<T> {}

    pub trait ConstantKind {
        fn choice_kind(&self) -> ConstantTag {
            ConstantTag
        }
    }

    impl<T: Clone + Send + Sync + 'static> ConstantKind for &T {}

    impl DeferredTag {
        pub fn lift<T>(self, value: ParameterValue<T>) -> ParameterValue<T> {
            value
        }
    }

    impl ConstantTag {
        pub fn lift<T: Clone + Send + Sync + 'static>(self, value: T) -> ParameterValue<T> {
            ParameterValue::constant(value)
        }
    }
}
