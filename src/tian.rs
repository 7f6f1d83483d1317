use crate::derivative::{DerivativeMethod, Derivatives};
use crate::filter::median_filter;
use crate::params::{ProcessingParameters, Variant};
use crate::series::TimeSeries;
use crate::{Error, Result};

/// The noise suppression actually applied in a correction run
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AppliedSmoothing {
    /// Median filter window, if the derivatives were estimated from a filtered signal
    pub median_filter_size: Option<usize>,
    /// Derivative estimator, `None` when no derivative was needed
    pub derivatives: Option<DerivativeMethod>,
}

/// Corrected heat flow together with the settings that produced it
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionResult {
    q_tian: Vec<f64>,
    variant: Variant,
    smoothing: AppliedSmoothing,
}

impl CorrectionResult {
    /// Corrected heat flow in W/g, one value per input sample
    pub fn q_tian(&self) -> &[f64] {
        &self.q_tian
    }

    /// Take the corrected heat flow, dropping the run metadata
    pub fn into_q_tian(self) -> Vec<f64> {
        self.q_tian
    }

    pub const fn variant(&self) -> Variant {
        self.variant
    }

    pub const fn smoothing(&self) -> AppliedSmoothing {
        self.smoothing
    }
}

/// Combine a signal with its derivatives according to the Tian model
///
/// For a single time constant
/// $$
///     q_{Tian} = q + \tau_1 \dot{q}
/// $$
/// and for two
/// $$
///     q_{Tian} = q + (\tau_1 + \tau_2) \dot{q} + \tau_1 \tau_2 \ddot{q}.
/// $$
/// With no time constant the signal is returned unchanged.
///
/// # Panics
/// If the derivatives are not aligned with `q`, or `variant` needs a second derivative that
/// `derivatives` does not carry.
pub fn apply_formula(q: &[f64], variant: Variant, derivatives: &Derivatives) -> Vec<f64> {
    match variant {
        Variant::None => q.to_vec(),
        Variant::SingleTau { tau1 } => {
            assert_eq!(q.len(), derivatives.first.len());
            q.iter()
                .zip(&derivatives.first)
                .map(|(q, dq1)| q + tau1 * dq1)
                .collect()
        }
        Variant::DoubleTau { tau1, tau2 } => {
            let second = derivatives
                .second
                .as_ref()
                .expect("two time constants require the second derivative");
            assert_eq!(q.len(), derivatives.first.len());
            assert_eq!(q.len(), second.len());
            q.iter()
                .zip(&derivatives.first)
                .zip(second)
                .map(|((q, dq1), dq2)| q + (tau1 + tau2) * dq1 + tau1 * tau2 * dq2)
                .collect()
        }
    }
}

/// Removes calorimeter thermal inertia from heat-flow series
///
/// The corrector is built once from validated parameters and may be reused for any number of
/// series, from any number of threads.
///
/// Derivatives are estimated from the median filtered signal when filtering is enabled, while
/// the value term of the correction always uses the measured signal. Correction quality is reduced
/// in the first and last few samples, where both the filter and the derivative estimates only see
/// one side of the signal; these samples are still returned.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TianCorrector {
    variant: Variant,
    median_filter_size: Option<usize>,
    method: DerivativeMethod,
}

impl TianCorrector {
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if `params` fails validation.
    pub fn new(params: &ProcessingParameters) -> Result<Self> {
        let variant = params.validate()?;
        Ok(Self {
            variant,
            median_filter_size: params
                .median_filter
                .apply
                .then_some(params.median_filter.size),
            method: DerivativeMethod::from_params(&params.spline_interpolation),
        })
    }

    pub const fn variant(&self) -> Variant {
        self.variant
    }

    /// Apply the correction to `series`
    ///
    /// # Errors
    /// - [`Error::InsufficientData`] if a correction is requested and the series is shorter than
    ///   the derivative method requires (four samples for splines, two for finite differences)
    /// - [`Error::Solver`] if a spline residual bound cannot be resolved
    pub fn correct(&self, series: &TimeSeries) -> Result<CorrectionResult> {
        let q = series.heat_flow_w_g();

        if self.variant == Variant::None {
            log::debug!("no time constant set, returning {} samples unchanged", q.len());
            return Ok(CorrectionResult {
                q_tian: q.to_vec(),
                variant: self.variant,
                smoothing: AppliedSmoothing {
                    median_filter_size: None,
                    derivatives: None,
                },
            });
        }

        let required = self.method.min_samples();
        if series.len() < required {
            return Err(Error::InsufficientData {
                required,
                actual: series.len(),
            });
        }

        let filtered;
        let q_work = match self.median_filter_size {
            Some(size) => {
                filtered = median_filter(q, size)?;
                &filtered[..]
            }
            None => q,
        };

        log::debug!(
            "correcting {} samples with {:?} using {:?}",
            q.len(),
            self.variant,
            self.method
        );
        let derivatives = self.method.estimate(
            series.time_s(),
            q_work,
            self.variant.needs_second_derivative(),
        )?;

        Ok(CorrectionResult {
            q_tian: apply_formula(q, self.variant, &derivatives),
            variant: self.variant,
            smoothing: AppliedSmoothing {
                median_filter_size: self.median_filter_size,
                derivatives: Some(self.method),
            },
        })
    }
}

/// Validate `params` and correct a single series
///
/// # Errors
/// See [`TianCorrector::new`] and [`TianCorrector::correct`].
pub fn correct(series: &TimeSeries, params: &ProcessingParameters) -> Result<CorrectionResult> {
    TianCorrector::new(params)?.correct(series)
}
