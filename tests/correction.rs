use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_rand::rand_distr::{Distribution, Normal};
use proptest::prelude::*;
use rand_isaac::Isaac64Rng;

use tian_correction::params::{TimeConstants, Variant};
use tian_correction::{correct, Error, ProcessingParameters, Result, TianCorrector, TimeSeries};

const TAU1: f64 = 300.;
const TAU2: f64 = 80.;

/// Hydration-like response of the instrument: a flat baseline with a broad peak
fn measured(t: f64) -> f64 {
    2e-4 + 3e-3 * (-((t - 15_000.) / 3000.).powi(2)).exp()
}

fn measured_derivatives(t: f64) -> (f64, f64) {
    let u = (t - 15_000.) / 3000.;
    let peak = 3e-3 * (-u * u).exp();
    let first = peak * (-2. * u / 3000.);
    let second = peak * (4. * u * u - 2.) / (3000. * 3000.);
    (first, second)
}

/// The reaction heat flow that the instrument turned into [`measured`]
fn true_heat_flow(t: f64) -> f64 {
    let (first, second) = measured_derivatives(t);
    measured(t) + (TAU1 + TAU2) * first + TAU1 * TAU2 * second
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn two_tau_params() -> ProcessingParameters {
    let mut params = ProcessingParameters::default();
    params.time_constants = TimeConstants {
        tau1: Some(TAU1),
        tau2: Some(TAU2),
    };
    params
}

#[test]
fn smoothing_lowers_the_error_of_the_corrected_signal() -> Result<()> {
    let seed = 40;
    let mut rng = Isaac64Rng::seed_from_u64(seed);
    let noise = Normal::new(0., 1e-6).unwrap();

    let t = (0..3000).map(|ii| f64::from(ii) * 10.).collect::<Vec<_>>();
    let q = t
        .iter()
        .enumerate()
        .map(|(ii, &t)| {
            let spike = if ii % 97 == 0 { 5e-5 } else { 0. };
            measured(t) + noise.sample(&mut rng) + spike
        })
        .collect::<Vec<_>>();
    let q_true = t.iter().map(|&t| true_heat_flow(t)).collect::<Vec<_>>();
    let series = TimeSeries::new(t, q)?;

    let raw_params = two_tau_params();

    let mut smooth_params = two_tau_params();
    smooth_params.median_filter.apply = true;
    smooth_params.median_filter.size = 7;
    smooth_params.spline_interpolation.apply = true;
    smooth_params.spline_interpolation.smoothing_1st_deriv = 1e-8;
    smooth_params.spline_interpolation.smoothing_2nd_deriv = 1e-6;

    let error = |params: &ProcessingParameters| -> Result<f64> {
        let result = correct(&series, params)?;
        let residual = result
            .q_tian()
            .iter()
            .zip(&q_true)
            .map(|(corrected, truth)| corrected - truth)
            .collect::<Vec<_>>();
        Ok(variance(&residual))
    };

    let raw_error = error(&raw_params)?;
    let smooth_error = error(&smooth_params)?;

    assert!(
        raw_error > 10. * smooth_error,
        "unsmoothed error {raw_error:e} should far exceed smoothed error {smooth_error:e}"
    );
    Ok(())
}

#[test]
fn single_tau_correction_of_a_sine() -> Result<()> {
    let omega = 2. * std::f64::consts::PI / 5000.;
    let series =
        TimeSeries::from_samples((0..2000).map(|ii| {
            let t = f64::from(ii) * 10.;
            (t, (omega * t).sin())
        }))?;

    let mut params = ProcessingParameters::default();
    params.time_constants.tau1 = Some(TAU1);
    params.spline_interpolation.apply = true;
    params.spline_interpolation.smoothing_1st_deriv = 0.;

    let spline_result = correct(&series, &params)?;
    params.spline_interpolation.apply = false;
    let difference_result = correct(&series, &params)?;

    for (ii, (t, q)) in series.samples().enumerate().skip(20).take(1960) {
        let expected = q + TAU1 * omega * (omega * t).cos();
        approx::assert_abs_diff_eq!(spline_result.q_tian()[ii], expected, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(difference_result.q_tian()[ii], expected, epsilon = 1e-3);
    }
    Ok(())
}

#[test]
fn constant_signals_are_left_unchanged() -> Result<()> {
    let seed = 40;
    let mut rng = Isaac64Rng::seed_from_u64(seed);
    let mut time = 0.;
    let series = TimeSeries::from_samples((0..500).map(|_| {
        time += rng.gen_range(5.0..15.0);
        (time, 2e-3)
    }))?;

    let mut params = two_tau_params();
    params.median_filter.apply = true;
    for apply_spline in [false, true] {
        params.spline_interpolation.apply = apply_spline;
        let result = correct(&series, &params)?;
        for (corrected, measured) in result.q_tian().iter().zip(series.heat_flow_w_g()) {
            approx::assert_abs_diff_eq!(corrected, measured, epsilon = 1e-10);
        }
    }
    Ok(())
}

#[test]
fn the_value_term_uses_the_unfiltered_signal() -> Result<()> {
    // A single spike on a flat signal vanishes from the median filtered derivative, but must
    // survive in the corrected output.
    let mut q = vec![1e-3; 101];
    q[50] = 2e-3;
    let t = (0..101).map(|ii| f64::from(ii) * 10.).collect::<Vec<_>>();
    let series = TimeSeries::new(t, q)?;

    let mut params = ProcessingParameters::default();
    params.time_constants.tau1 = Some(TAU1);
    params.median_filter.apply = true;
    params.median_filter.size = 5;

    let result = correct(&series, &params)?;

    assert_eq!(result.q_tian(), series.heat_flow_w_g());
    Ok(())
}

#[test]
fn validation_failures() {
    let series = TimeSeries::from_samples([(0., 1e-3), (10., 2e-3)]).unwrap();

    let mut params = ProcessingParameters::default();
    params.time_constants.tau2 = Some(TAU2);
    assert!(matches!(
        correct(&series, &params),
        Err(Error::InvalidParameter { .. })
    ));

    let mut params = two_tau_params();
    params.median_filter.apply = true;
    params.median_filter.size = 10;
    assert!(matches!(
        correct(&series, &params),
        Err(Error::InvalidParameter { .. })
    ));

    let mut params = two_tau_params();
    params.spline_interpolation.apply = true;
    assert!(matches!(
        correct(&series, &params),
        Err(Error::InsufficientData {
            required: 4,
            actual: 2
        })
    ));
}

#[test]
fn independent_series_can_be_corrected_in_parallel() -> Result<()> {
    let mut params = two_tau_params();
    params.spline_interpolation.apply = true;
    let corrector = TianCorrector::new(&params)?;
    assert_eq!(
        corrector.variant(),
        Variant::DoubleTau {
            tau1: TAU1,
            tau2: TAU2
        }
    );

    let experiments = (1..=4)
        .map(|scale| {
            TimeSeries::from_samples((0..400).map(|ii| {
                let t = f64::from(ii) * 30.;
                (t, f64::from(scale) * measured(t))
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    let sequential = experiments
        .iter()
        .map(|series| corrector.correct(series))
        .collect::<Result<Vec<_>>>()?;

    let parallel = std::thread::scope(|scope| {
        let handles = experiments
            .iter()
            .map(|series| scope.spawn(move || corrector.correct(series)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("correction thread panicked"))
            .collect::<Result<Vec<_>>>()
    })?;

    assert_eq!(sequential, parallel);
    Ok(())
}

fn arbitrary_series(min_len: usize) -> impl Strategy<Value = TimeSeries> {
    proptest::collection::vec((0.1f64..100.0, -1e-2f64..1e-2), min_len..200).prop_map(
        |samples| {
            let mut time = 0.;
            TimeSeries::from_samples(samples.into_iter().map(|(step, q)| {
                time += step;
                (time, q)
            }))
            .unwrap()
        },
    )
}

proptest! {
    #[test]
    fn no_time_constant_is_the_identity(series in arbitrary_series(0), spline in any::<bool>()) {
        let mut params = ProcessingParameters::default();
        params.median_filter.apply = true;
        params.spline_interpolation.apply = spline;

        let result = correct(&series, &params).unwrap();

        prop_assert_eq!(result.q_tian(), series.heat_flow_w_g());
    }

    #[test]
    fn output_is_aligned_with_the_input(
        series in arbitrary_series(4),
        spline in any::<bool>(),
        filter in any::<bool>(),
        second in any::<bool>(),
    ) {
        let mut params = ProcessingParameters::default();
        params.time_constants.tau1 = Some(TAU1);
        params.time_constants.tau2 = second.then_some(TAU2);
        params.median_filter.apply = filter;
        params.spline_interpolation.apply = spline;

        let result = correct(&series, &params).unwrap();

        prop_assert_eq!(result.q_tian().len(), series.len());
        prop_assert!(result.q_tian().iter().all(|value| value.is_finite()));
    }
}
