//! Cubic smoothing splines with analytic derivatives
//!
//! The fitted curve $f$ minimises
//! $$
//!     \sum_i \left(q_i - f(x_i)\right)^2 + \lambda \int f''(x)^2 \mathrm{d}x
//! $$
//! over natural cubic splines with a knot at every sample. Following Reinsch, the second
//! derivatives $\gamma$ at the interior knots solve the pentadiagonal system
//! $$
//!     \left(R + \lambda Q^T Q\right) \gamma = Q^T q, \qquad f = q - \lambda Q \gamma,
//! $$
//! where $Q$ holds the divided difference weights and $R$ the spline continuity conditions. The
//! time axis is rescaled to `[0, 1]` before fitting so that $\lambda$ does not depend on the
//! experiment duration; derivatives are converted back to seconds on output.
//!
//! Natural splines have a vanishing second derivative at both end points, so second derivative
//! estimates in the first and last few samples are biased towards zero.

use argmin::core::{CostFunction, Executor, State};
use argmin::solver::brent::BrentRoot;
use ndarray::Array1;

use crate::math::solve_pentadiagonal;
use crate::params::SmoothingCriterion;
use crate::{Error, Result};

/// Fewest samples a cubic smoothing spline is fitted to
pub const MIN_SAMPLES: usize = 4;

/// Penalty search range, as decades relative to the cube of the mean knot spacing
const SEARCH_DECADES: (f64, f64) = (-8., 10.);
const SEARCH_TOLERANCE: f64 = 1e-10;
const SEARCH_MAX_ITERS: u64 = 200;

/// Pre-assembled matrices of the Reinsch system for one set of samples
#[derive(Clone, Debug)]
struct ReinschSystem {
    origin: f64,
    span: f64,
    /// Knot positions on the rescaled axis
    x: Vec<f64>,
    /// Knot spacing on the rescaled axis
    h: Vec<f64>,
    y: Array1<f64>,
    qty: Array1<f64>,
    r_diag: Array1<f64>,
    r_first: Array1<f64>,
    qtq_diag: Array1<f64>,
    qtq_first: Array1<f64>,
    qtq_second: Array1<f64>,
}

impl ReinschSystem {
    fn new(t: &[f64], q: &[f64]) -> Result<Self> {
        validate_samples(t, q)?;

        let n = t.len();
        let origin = t[0];
        let span = t[n - 1] - origin;
        let x = t.iter().map(|t| (t - origin) / span).collect::<Vec<_>>();
        let h = x.windows(2).map(|pair| pair[1] - pair[0]).collect::<Vec<_>>();

        // Column `k` of Q (interior knot k + 1) has non-zeros in rows k, k + 1 and k + 2
        let m = n - 2;
        let lower = Array1::from_iter((0..m).map(|k| 1. / h[k]));
        let centre = Array1::from_iter((0..m).map(|k| -1. / h[k] - 1. / h[k + 1]));
        let upper = Array1::from_iter((0..m).map(|k| 1. / h[k + 1]));

        let qty = Array1::from_iter(
            (0..m).map(|k| lower[k] * q[k] + centre[k] * q[k + 1] + upper[k] * q[k + 2]),
        );

        let r_diag = Array1::from_iter((0..m).map(|k| (h[k] + h[k + 1]) / 3.));
        let r_first = Array1::from_iter((0..m).map(|k| if k + 1 < m { h[k + 1] / 6. } else { 0. }));

        let qtq_diag = Array1::from_iter(
            (0..m).map(|k| lower[k].powi(2) + centre[k].powi(2) + upper[k].powi(2)),
        );
        let qtq_first = Array1::from_iter((0..m).map(|k| {
            if k + 1 < m {
                centre[k] * lower[k + 1] + upper[k] * centre[k + 1]
            } else {
                0.
            }
        }));
        let qtq_second = Array1::from_iter((0..m).map(|k| {
            if k + 2 < m {
                upper[k] * lower[k + 2]
            } else {
                0.
            }
        }));

        Ok(Self {
            origin,
            span,
            x,
            h,
            y: Array1::from(q.to_vec()),
            qty,
            r_diag,
            r_first,
            qtq_diag,
            qtq_first,
            qtq_second,
        })
    }

    fn len(&self) -> usize {
        self.x.len()
    }

    /// Mean knot spacing cubed, the natural scale of the penalty
    fn penalty_scale(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let mean_spacing = 1. / (self.len() - 1) as f64;
        mean_spacing.powi(3)
    }

    /// Fitted values and second derivatives (on the rescaled axis) at every knot
    fn solve(&self, penalty: f64) -> Result<(Array1<f64>, Array1<f64>)> {
        let n = self.len();
        let diag = &self.r_diag + &(&self.qtq_diag * penalty);
        let first = &self.r_first + &(&self.qtq_first * penalty);
        let second = &self.qtq_second * penalty;
        let interior = solve_pentadiagonal(&diag, &first, &second, &self.qty)?;

        let mut curvature = Array1::<f64>::zeros(n);
        curvature
            .slice_mut(ndarray::s![1..n - 1])
            .assign(&interior);

        let mut q_gamma = Array1::<f64>::zeros(n);
        for (k, gamma) in interior.iter().enumerate() {
            q_gamma[k] += gamma / self.h[k];
            q_gamma[k + 1] -= gamma * (1. / self.h[k] + 1. / self.h[k + 1]);
            q_gamma[k + 2] += gamma / self.h[k + 1];
        }
        let values = &self.y - &(q_gamma * penalty);

        Ok((values, curvature))
    }

    fn residual_sum_of_squares(&self, values: &Array1<f64>) -> f64 {
        (&self.y - values).mapv(|r| r * r).sum()
    }
}

fn validate_samples(t: &[f64], q: &[f64]) -> Result<()> {
    if t.len() != q.len() {
        let index = t.len().min(q.len());
        return Err(Error::InvalidInput {
            index,
            time: t.get(index).copied().unwrap_or(f64::NAN),
            reason: format!("{} time stamps but {} values", t.len(), q.len()),
        });
    }
    if t.len() < MIN_SAMPLES {
        return Err(Error::InsufficientData {
            required: MIN_SAMPLES,
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
    Ok(())
}

/// A fitted natural cubic smoothing spline
#[derive(Clone, Debug)]
pub struct SmoothingSpline {
    knots: Vec<f64>,
    x: Vec<f64>,
    h: Vec<f64>,
    origin: f64,
    span: f64,
    values: Vec<f64>,
    curvature: Vec<f64>,
    penalty: f64,
    residual_sum_of_squares: f64,
}

impl SmoothingSpline {
    /// Fit with a fixed roughness penalty
    ///
    /// A penalty of zero interpolates the samples; as the penalty grows the fit tends to the
    /// least squares straight line.
    ///
    /// # Errors
    /// - [`Error::InsufficientData`] for fewer than [`MIN_SAMPLES`] samples
    /// - [`Error::InvalidInput`] for non-finite samples or a time axis that is not strictly
    ///   increasing
    /// - [`Error::InvalidParameter`] for a negative or non-finite penalty
    pub fn fit(t: &[f64], q: &[f64], penalty: f64) -> Result<Self> {
        if !penalty.is_finite() || penalty < 0. {
            return Err(Error::invalid_parameter(
                "penalty",
                format!("must be finite and non-negative, got {penalty}"),
            ));
        }
        let system = ReinschSystem::new(t, q)?;
        Self::from_system(system, penalty)
    }

    /// Fit the smoothest spline whose sum of squared residuals equals `bound`
    ///
    /// This is the smoothing criterion of FITPACK's `curfit`. A bound of zero interpolates. A
    /// bound beyond what the search range can reach, which is close to the straight line
    /// residual, yields the smoothest fit in the range.
    ///
    /// # Errors
    /// As [`SmoothingSpline::fit`], plus [`Error::Solver`] if the penalty search fails.
    pub fn fit_with_residual_bound(t: &[f64], q: &[f64], bound: f64) -> Result<Self> {
        if !bound.is_finite() || bound < 0. {
            return Err(Error::invalid_parameter(
                "residual bound",
                format!("must be finite and non-negative, got {bound}"),
            ));
        }
        let system = ReinschSystem::new(t, q)?;
        if bound <= 0. {
            return Self::from_system(system, 0.);
        }

        let scale = system.penalty_scale();
        let (low, high) = SEARCH_DECADES;
        let search = PenaltySearch {
            system: system.clone(),
            bound,
            scale,
        };

        let residual_low = search.residual_at(low)?;
        if residual_low >= bound {
            log::debug!(
                "residual bound {bound:e} below the least smoothing in range ({residual_low:e}), interpolating"
            );
            return Self::from_system(system, 0.);
        }
        let residual_high = search.residual_at(high)?;
        if residual_high <= bound {
            log::warn!(
                "residual bound {bound:e} exceeds the smoothest fit in range ({residual_high:e})"
            );
            return Self::from_system(system, scale * 10f64.powf(high));
        }

        let solver = BrentRoot::new(low, high, SEARCH_TOLERANCE);
        let res = Executor::new(search, solver)
            .configure(|state| state.max_iters(SEARCH_MAX_ITERS))
            .run()?;
        let decades = res
            .state()
            .get_best_param()
            .copied()
            .ok_or_else(|| Error::Solver("penalty search returned no estimate".into()))?;

        let penalty = scale * 10f64.powf(decades);
        log::debug!("residual bound {bound:e} resolved to penalty {penalty:e}");
        Self::from_system(system, penalty)
    }

    /// Fit according to a smoothing factor and its interpretation
    ///
    /// # Errors
    /// See [`SmoothingSpline::fit`] and [`SmoothingSpline::fit_with_residual_bound`].
    pub fn fit_with(
        t: &[f64],
        q: &[f64],
        smoothing: f64,
        criterion: SmoothingCriterion,
    ) -> Result<Self> {
        match criterion {
            SmoothingCriterion::Penalty => Self::fit(t, q, smoothing),
            SmoothingCriterion::ResidualBound => Self::fit_with_residual_bound(t, q, smoothing),
        }
    }

    fn from_system(system: ReinschSystem, penalty: f64) -> Result<Self> {
        let (values, curvature) = system.solve(penalty)?;
        let residual_sum_of_squares = system.residual_sum_of_squares(&values);
        let knots = system
            .x
            .iter()
            .map(|x| system.origin + x * system.span)
            .collect();

        Ok(Self {
            knots,
            x: system.x,
            h: system.h,
            origin: system.origin,
            span: system.span,
            values: values.to_vec(),
            curvature: curvature.to_vec(),
            penalty,
            residual_sum_of_squares,
        })
    }

    /// The roughness penalty used, on the rescaled time axis
    pub const fn penalty(&self) -> f64 {
        self.penalty
    }

    pub const fn residual_sum_of_squares(&self) -> f64 {
        self.residual_sum_of_squares
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Fitted values at the knots
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Slope of the spline at the knot `ii`, on the rescaled axis
    fn knot_slope(&self, ii: usize) -> f64 {
        let n = self.x.len();
        if ii + 1 < n {
            let h = self.h[ii];
            (self.values[ii + 1] - self.values[ii]) / h
                - h * (2. * self.curvature[ii] + self.curvature[ii + 1]) / 6.
        } else {
            let h = self.h[n - 2];
            (self.values[n - 1] - self.values[n - 2]) / h
                + h * (self.curvature[n - 2] + 2. * self.curvature[n - 1]) / 6.
        }
    }

    /// First derivative at every knot, per second
    pub fn first_derivative(&self) -> Vec<f64> {
        (0..self.x.len())
            .map(|ii| self.knot_slope(ii) / self.span)
            .collect()
    }

    /// Second derivative at every knot, per second squared
    ///
    /// Zero at the first and last knot by construction.
    pub fn second_derivative(&self) -> Vec<f64> {
        let scale = self.span * self.span;
        self.curvature.iter().map(|gamma| gamma / scale).collect()
    }

    /// Evaluate the spline at an arbitrary time
    ///
    /// Outside the knot range the natural spline continues as a straight line.
    pub fn evaluate(&self, time_s: f64) -> f64 {
        let n = self.x.len();
        let x = (time_s - self.origin) / self.span;
        if x <= self.x[0] {
            return self.values[0] + (x - self.x[0]) * self.knot_slope(0);
        }
        if x >= self.x[n - 1] {
            return self.values[n - 1] + (x - self.x[n - 1]) * self.knot_slope(n - 1);
        }

        let ii = self.x.partition_point(|&knot| knot <= x) - 1;
        let h = self.h[ii];
        let left = x - self.x[ii];
        let right = self.x[ii + 1] - x;
        (left * self.values[ii + 1] + right * self.values[ii]) / h
            - left * right / 6.
                * ((1. + left / h) * self.curvature[ii + 1]
                    + (1. + right / h) * self.curvature[ii])
    }
}

/// Root search for the penalty, in decades relative to the natural penalty scale
struct PenaltySearch {
    system: ReinschSystem,
    bound: f64,
    scale: f64,
}

impl PenaltySearch {
    fn residual_at(&self, decades: f64) -> Result<f64> {
        let (values, _) = self.system.solve(self.scale * 10f64.powf(decades))?;
        Ok(self.system.residual_sum_of_squares(&values))
    }
}

impl CostFunction for PenaltySearch {
    type Param = f64;
    type Output = f64;

    fn cost(&self, decades: &Self::Param) -> ::std::result::Result<Self::Output, argmin::core::Error> {
        Ok(self.residual_at(*decades)? - self.bound)
    }
}
