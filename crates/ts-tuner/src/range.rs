//! Arithmetic behind `range` declarations.
//!
//! A range `begin..end` walked by `step` is registered with the backend as a
//! canonical index range `[0, size)`; the tuner maps the chosen index back to
//! `begin + index * step`.

use num_traits::Float;
use std::time::Duration;

/// Why a range could not be measured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// Step is zero, negative or not finite.
    NonPositive,
    /// The number of steps does not fit the value type's index arithmetic.
    TooManySteps,
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositive => write!(f, "step must be positive and finite"),
            Self::TooManySteps => write!(f, "range has too many steps"),
        }
    }
}

/// Values a range can be declared over.
pub trait RangeValue: Clone + Send + Sync + 'static {
    /// ⌈(end − begin) / step⌉, or zero when `end <= begin`.
    fn steps_between(begin: &Self, end: &Self, step: &Self) -> Result<usize, StepError>;

    /// `begin + index * step`. Only called with `index` below
    /// [`steps_between`](Self::steps_between), and yields exactly `begin` for
    /// index zero.
    fn nth(begin: &Self, index: usize, step: &Self) -> Self;
}

/// Range values with a natural unit step.
pub trait UnitStep: RangeValue {
    fn unit() -> Self;
}

macro_rules! impl_int_range {
    ($($t:ty),* $(,)?) => {$(
        impl RangeValue for $t {
            fn steps_between(begin: &Self, end: &Self, step: &Self) -> Result<usize, StepError> {
                if *step <= 0 as $t {
                    return Err(StepError::NonPositive);
                }
                if end <= begin {
                    return Ok(0);
                }
                let span = *end as i128 - *begin as i128;
                let step = *step as i128;
                usize::try_from((span + step - 1) / step).map_err(|_| StepError::TooManySteps)
            }

            fn nth(begin: &Self, index: usize, step: &Self) -> Self {
                (*begin as i128 + index as i128 * *step as i128) as $t
            }
        }

        impl UnitStep for $t {
            fn unit() -> Self {
                1
            }
        }
    )*};
}

impl_int_range!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

fn float_steps<F: Float>(begin: F, end: F, step: F) -> Result<usize, StepError> {
    if !step.is_finite() || step <= F::zero() {
        return Err(StepError::NonPositive);
    }
    if end <= begin {
        return Ok(0);
    }
    ((end - begin) / step)
        .ceil()
        .to_usize()
        .ok_or(StepError::TooManySteps)
}

macro_rules! impl_float_range {
    ($($t:ty),* $(,)?) => {$(
        impl RangeValue for $t {
            fn steps_between(begin: &Self, end: &Self, step: &Self) -> Result<usize, StepError> {
                float_steps(*begin, *end, *step)
            }

            fn nth(begin: &Self, index: usize, step: &Self) -> Self {
                *begin + index as $t * *step
            }
        }

        impl UnitStep for $t {
            fn unit() -> Self {
                1.0
            }
        }
    )*};
}

impl_float_range!(f32, f64);

impl RangeValue for Duration {
    fn steps_between(begin: &Self, end: &Self, step: &Self) -> Result<usize, StepError> {
        if step.is_zero() {
            return Err(StepError::NonPositive);
        }
        if end <= begin {
            return Ok(0);
        }
        let steps = (*end - *begin).as_nanos().div_ceil(step.as_nanos());
        // `nth` scales the step by a u32
        u32::try_from(steps)
            .map(|s| s as usize)
            .map_err(|_| StepError::TooManySteps)
    }

    fn nth(begin: &Self, index: usize, step: &Self) -> Self {
        *begin + *step * index as u32
    }
}
