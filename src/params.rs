use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::filter;
use crate::{Error, Result};

/// Settings for one correction run
///
/// Groups mirror the configuration file layout:
///
/// ```toml
/// [time_constants]
/// tau1 = 300.0
/// tau2 = 80.0
///
/// [median_filter]
/// apply = true
/// size = 7
///
/// [spline_interpolation]
/// apply = true
/// smoothing_1st_deriv = 1e-9
/// smoothing_2nd_deriv = 1e-7
/// criterion = "penalty"
/// ```
///
/// Every group and field is optional in the file and falls back to its default. The library never
/// mutates a parameter set; callers may adjust fields between runs and should call
/// [`ProcessingParameters::validate`] (which `correct` does too) before use.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingParameters {
    pub time_constants: TimeConstants,
    pub median_filter: MedianFilter,
    pub spline_interpolation: SplineInterpolation,
    pub downsample: Downsample,
}

/// Thermal time constants of the calorimeter, in seconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeConstants {
    /// Primary time constant
    pub tau1: Option<f64>,
    /// Secondary time constant, only meaningful together with `tau1`
    pub tau2: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MedianFilter {
    pub apply: bool,
    /// Odd window width in samples
    pub size: usize,
}

impl Default for MedianFilter {
    fn default() -> Self {
        Self {
            apply: false,
            size: 7,
        }
    }
}

/// How the spline smoothing factors are interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingCriterion {
    /// The factor is the roughness penalty $\lambda$ on a time axis rescaled to `[0, 1]`
    #[default]
    Penalty,
    /// The factor bounds the sum of squared residuals of the fit, in (W/g)^2
    ResidualBound,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplineInterpolation {
    pub apply: bool,
    pub smoothing_1st_deriv: f64,
    pub smoothing_2nd_deriv: f64,
    pub criterion: SmoothingCriterion,
}

impl Default for SplineInterpolation {
    fn default() -> Self {
        Self {
            apply: false,
            smoothing_1st_deriv: 1e-9,
            smoothing_2nd_deriv: 1e-7,
            criterion: SmoothingCriterion::Penalty,
        }
    }
}

/// Curvature weighted thinning of long series
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Downsample {
    pub apply: bool,
    /// Target number of samples; duplicates are merged so fewer may be returned
    pub num_points: usize,
    /// Roughness penalty of the spline used to estimate curvature
    pub smoothing_factor: f64,
    /// Share of the sampling density spread uniformly regardless of curvature
    pub baseline_weight: f64,
    /// Thin the early and late part of the experiment separately
    pub section_split: bool,
    pub section_split_time_s: f64,
}

impl Default for Downsample {
    fn default() -> Self {
        Self {
            apply: false,
            num_points: 1000,
            smoothing_factor: 1e-9,
            baseline_weight: 0.1,
            section_split: false,
            section_split_time_s: 1000.,
        }
    }
}

/// Which form of the correction a parameter set requests
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Variant {
    /// No time constant: the measured signal is returned unchanged
    None,
    SingleTau { tau1: f64 },
    DoubleTau { tau1: f64, tau2: f64 },
}

impl Variant {
    /// Whether the second derivative of the heat flow is needed
    pub const fn needs_second_derivative(&self) -> bool {
        matches!(self, Self::DoubleTau { .. })
    }
}

fn check_time_constant(name: &'static str, value: Option<f64>) -> Result<()> {
    match value {
        Some(tau) if !tau.is_finite() || tau <= 0. => Err(Error::invalid_parameter(
            name,
            format!("time constant must be a positive number of seconds, got {tau}"),
        )),
        _ => Ok(()),
    }
}

fn check_smoothing(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0. {
        return Err(Error::invalid_parameter(
            name,
            format!("smoothing factor must be finite and non-negative, got {value}"),
        ));
    }
    Ok(())
}

impl TimeConstants {
    /// Resolve the time constants into a correction variant
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] for a non-positive time constant, or when `tau2` is
    /// set without `tau1`: the thermal model has no meaning for a secondary constant alone.
    pub fn variant(&self) -> Result<Variant> {
        check_time_constant("time_constants.tau1", self.tau1)?;
        check_time_constant("time_constants.tau2", self.tau2)?;
        match (self.tau1, self.tau2) {
            (None, None) => Ok(Variant::None),
            (Some(tau1), None) => Ok(Variant::SingleTau { tau1 }),
            (Some(tau1), Some(tau2)) => Ok(Variant::DoubleTau { tau1, tau2 }),
            (None, Some(_)) => Err(Error::invalid_parameter(
                "time_constants.tau2",
                "tau2 requires tau1 to be set",
            )),
        }
    }
}

impl Downsample {
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if the settings cannot produce a sampling density.
    pub fn validate(&self) -> Result<()> {
        if self.num_points == 0 || (self.section_split && self.num_points < 2) {
            return Err(Error::invalid_parameter(
                "downsample.num_points",
                format!(
                    "at least one point per section is required, got {}",
                    self.num_points
                ),
            ));
        }
        check_smoothing("downsample.smoothing_factor", self.smoothing_factor)?;
        if !self.baseline_weight.is_finite() || self.baseline_weight < 0. {
            return Err(Error::invalid_parameter(
                "downsample.baseline_weight",
                format!(
                    "weight must be finite and non-negative, got {}",
                    self.baseline_weight
                ),
            ));
        }
        if self.section_split && !self.section_split_time_s.is_finite() {
            return Err(Error::invalid_parameter(
                "downsample.section_split_time_s",
                "split time must be finite",
            ));
        }
        Ok(())
    }
}

impl ProcessingParameters {
    /// Parse parameters from a TOML document
    ///
    /// # Errors
    /// Returns an error if the document is malformed, contains unknown keys, or the resulting
    /// parameters fail [`ProcessingParameters::validate`].
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let params: Self = toml::from_str(document)?;
        params.validate()?;
        Ok(params)
    }

    /// Read parameters from a TOML file
    ///
    /// # Errors
    /// See [`ProcessingParameters::from_toml_str`]. Also fails if the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        let document = fs::read_to_string(path)?;
        Self::from_toml_str(&document)
    }

    /// Check the whole parameter set and resolve the correction variant
    ///
    /// Settings of disabled groups are not checked, so a switched-off median filter may carry any
    /// window size.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] naming the first offending option.
    pub fn validate(&self) -> Result<Variant> {
        let variant = self.time_constants.variant()?;
        if self.median_filter.apply {
            filter::validate_window(self.median_filter.size)?;
        }
        if self.spline_interpolation.apply {
            check_smoothing(
                "spline_interpolation.smoothing_1st_deriv",
                self.spline_interpolation.smoothing_1st_deriv,
            )?;
            check_smoothing(
                "spline_interpolation.smoothing_2nd_deriv",
                self.spline_interpolation.smoothing_2nd_deriv,
            )?;
        }
        if self.downsample.apply {
            self.downsample.validate()?;
        }
        Ok(variant)
    }
}
