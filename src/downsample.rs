use crate::params::Downsample;
use crate::series::TimeSeries;
use crate::spline::{self, SmoothingSpline};
use crate::Result;

/// Added to every curvature so flat stretches still have a defined density
const CURVATURE_FLOOR: f64 = 1e-15;

/// Pick up to `num_points` sample indices, concentrated where the heat flow bends
///
/// The curvature $|q''|$ of a smoothing spline fit, normalised to unit sum and mixed with a
/// uniform share of `baseline_weight / num_points` per sample, forms a sampling density. Indices
/// are drawn at evenly spaced quantiles of that density, so peaks and shoulders of the hydration
/// curve keep their resolution while the slow tail is thinned. The first sample is always kept.
///
/// Returns every index if the series has no more than `num_points` samples, or too few samples
/// for a spline fit.
///
/// # Errors
/// Propagates spline fitting errors, e.g. a negative `smoothing_factor`.
pub fn downsample_indices(
    t: &[f64],
    q: &[f64],
    num_points: usize,
    smoothing_factor: f64,
    baseline_weight: f64,
) -> Result<Vec<usize>> {
    let n = t.len();
    if n <= num_points || n < spline::MIN_SAMPLES {
        return Ok((0..n).collect());
    }

    let curvature = SmoothingSpline::fit(t, q, smoothing_factor)?
        .second_derivative()
        .into_iter()
        .map(|d2| d2.abs() + CURVATURE_FLOOR)
        .collect::<Vec<_>>();
    let total: f64 = curvature.iter().sum();

    #[allow(clippy::cast_precision_loss)]
    let baseline = baseline_weight / num_points as f64;
    let density = curvature
        .iter()
        .map(|c| c / total + baseline)
        .collect::<Vec<_>>();
    let norm: f64 = density.iter().sum();

    let cdf = density
        .iter()
        .scan(0., |acc, p| {
            *acc += p / norm;
            Some(*acc)
        })
        .collect::<Vec<_>>();

    #[allow(clippy::cast_precision_loss)]
    let mut indices = (0..num_points)
        .map(|k| k as f64 / num_points as f64)
        .map(|quantile| cdf.partition_point(|&c| c < quantile).min(n - 1))
        .collect::<Vec<_>>();
    indices.dedup();

    Ok(indices)
}

/// Thin a series according to `params`
///
/// A disabled group (`params.apply == false`) returns the series unchanged without checking the
/// remaining settings.
///
/// With `section_split` the samples before and after `section_split_time_s` are thinned
/// separately with half the point budget each, which keeps the early dormant period from being
/// starved by the main hydration peak.
///
/// # Errors
/// Returns [`crate::Error::InvalidParameter`] for unusable settings and propagates spline fitting
/// errors.
pub fn adaptive_downsample(series: &TimeSeries, params: &Downsample) -> Result<TimeSeries> {
    if !params.apply {
        return Ok(series.clone());
    }
    params.validate()?;

    let thin = |section: &TimeSeries, num_points: usize| -> Result<TimeSeries> {
        let indices = downsample_indices(
            section.time_s(),
            section.heat_flow_w_g(),
            num_points,
            params.smoothing_factor,
            params.baseline_weight,
        )?;
        Ok(section.select(&indices))
    };

    let thinned = if params.section_split {
        let (early, late) = series.split_at_time(params.section_split_time_s);
        let budget = params.num_points / 2;
        thin(&early, budget)?.concat(thin(&late, budget)?)?
    } else {
        thin(series, params.num_points)?
    };

    log::debug!(
        "downsampled {} samples to {}",
        series.len(),
        thinned.len()
    );
    Ok(thinned)
}
