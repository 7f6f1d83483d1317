use serde::Serialize;

use crate::math::gradient;
use crate::params::{SmoothingCriterion, SplineInterpolation};
use crate::spline::{self, SmoothingSpline};
use crate::{Error, Result};

/// Fewest samples finite differences need to produce a slope
pub const MIN_FINITE_DIFFERENCE_SAMPLES: usize = 2;

/// Time derivatives of a heat-flow series, aligned with its samples
#[derive(Clone, Debug, PartialEq)]
pub struct Derivatives {
    /// $\mathrm{d}q / \mathrm{d}t$ in W/g/s
    pub first: Vec<f64>,
    /// $\mathrm{d}^2 q / \mathrm{d}t^2$ in W/g/s², present when requested
    pub second: Option<Vec<f64>>,
}

/// Derivatives from two independently smoothed splines
///
/// The first derivative comes from a spline fitted with `smoothing_1st`, the second derivative
/// from a separate fit with `smoothing_2nd`. The second fit is usually smoother, as each
/// differentiation amplifies the remaining noise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SmoothDerivativeEstimator {
    pub smoothing_1st: f64,
    pub smoothing_2nd: f64,
    pub criterion: SmoothingCriterion,
}

impl SmoothDerivativeEstimator {
    pub const fn new(smoothing_1st: f64, smoothing_2nd: f64) -> Self {
        Self {
            smoothing_1st,
            smoothing_2nd,
            criterion: SmoothingCriterion::Penalty,
        }
    }

    #[must_use]
    pub fn with_criterion(mut self, criterion: SmoothingCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Estimate derivatives at the sample times `t`
    ///
    /// # Errors
    /// - [`Error::InsufficientData`] for fewer than four samples
    /// - [`Error::InvalidInput`] naming the first non-finite or out of order sample
    /// - [`Error::InvalidParameter`] for a negative smoothing factor
    /// - [`Error::Solver`] if a residual bound cannot be resolved
    pub fn estimate(&self, t: &[f64], q: &[f64], need_second: bool) -> Result<Derivatives> {
        let first =
            SmoothingSpline::fit_with(t, q, self.smoothing_1st, self.criterion)?.first_derivative();

        let second = if need_second {
            let spline = SmoothingSpline::fit_with(t, q, self.smoothing_2nd, self.criterion)?;
            Some(spline.second_derivative())
        } else {
            None
        };

        Ok(Derivatives { first, second })
    }
}

/// Derivatives from central differences of the raw samples
///
/// No regularisation is applied, so noise in `q` is amplified by roughly the inverse sampling
/// interval for the first derivative and its square for the second. Intended for comparison with
/// the smoothed estimate and for debugging.
///
/// # Errors
/// Returns [`Error::InsufficientData`] for fewer than two samples and [`Error::InvalidInput`]
/// for non-finite or out of order samples.
pub fn finite_differences(t: &[f64], q: &[f64], need_second: bool) -> Result<Derivatives> {
    if t.len() != q.len() {
        let index = t.len().min(q.len());
        return Err(Error::InvalidInput {
            index,
            time: t.get(index).copied().unwrap_or(f64::NAN),
            reason: format!("{} time stamps but {} values", t.len(), q.len()),
        });
    }
    if t.len() < MIN_FINITE_DIFFERENCE_SAMPLES {
        return Err(Error::InsufficientData {
            required: MIN_FINITE_DIFFERENCE_SAMPLES,
            actual: t.len(),
        });
    }
    for (index, (&time, &value)) in t.iter().zip(q).enumerate() {
        if !time.is_finite() || !value.is_finite() {
            return Err(Error::InvalidInput {
                index,
                time,
                reason: format!("sample ({time}, {value}) is not finite"),
            });
        }
        if index > 0 && time <= t[index - 1] {
            return Err(Error::InvalidInput {
                index,
                time,
                reason: "time stamps must be strictly increasing".into(),
            });
        }
    }

    let first = gradient(q, t);
    let second = need_second.then(|| gradient(&first, t));
    Ok(Derivatives { first, second })
}

/// How derivatives were, or are to be, estimated
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DerivativeMethod {
    FiniteDifference,
    Spline(SmoothDerivativeEstimator),
}

impl DerivativeMethod {
    pub fn from_params(params: &SplineInterpolation) -> Self {
        if params.apply {
            Self::Spline(
                SmoothDerivativeEstimator::new(
                    params.smoothing_1st_deriv,
                    params.smoothing_2nd_deriv,
                )
                .with_criterion(params.criterion),
            )
        } else {
            Self::FiniteDifference
        }
    }

    pub const fn min_samples(&self) -> usize {
        match self {
            Self::FiniteDifference => MIN_FINITE_DIFFERENCE_SAMPLES,
            Self::Spline(_) => spline::MIN_SAMPLES,
        }
    }

    /// # Errors
    /// See [`finite_differences`] and [`SmoothDerivativeEstimator::estimate`].
    pub fn estimate(&self, t: &[f64], q: &[f64], need_second: bool) -> Result<Derivatives> {
        match self {
            Self::FiniteDifference => finite_differences(t, q, need_second),
            Self::Spline(estimator) => estimator.estimate(t, q, need_second),
        }
    }
}
