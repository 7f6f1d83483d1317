use num_traits::Float;

use crate::math::median_in_place;
use crate::{Error, Result};

/// Smallest admissible median filter window
pub const MIN_WINDOW: usize = 3;

/// Check a median filter window width
///
/// # Errors
/// Returns [`Error::InvalidParameter`] if `size` is even or smaller than [`MIN_WINDOW`]. Even
/// widths are never rounded.
pub fn validate_window(size: usize) -> Result<()> {
    if size < MIN_WINDOW {
        return Err(Error::invalid_parameter(
            "median_filter.size",
            format!("window must be at least {MIN_WINDOW}, got {size}"),
        ));
    }
    if size % 2 == 0 {
        return Err(Error::invalid_parameter(
            "median_filter.size",
            format!("window must be odd, got {size}"),
        ));
    }
    Ok(())
}

/// Map a possibly out-of-range index onto `0..len` by half-sample symmetric reflection
///
/// The series is extended as `d c b a | a b c d | d c b a`, repeating as often as needed so
/// windows wider than the series remain defined.
fn reflect(index: isize, len: usize) -> usize {
    let len = isize::try_from(len).expect("series length fits in `isize`");
    let period = 2 * len;
    let wrapped = index.rem_euclid(period);
    let folded = if wrapped < len {
        wrapped
    } else {
        period - 1 - wrapped
    };
    usize::try_from(folded).expect("folded index is non-negative")
}

/// Apply a sliding-window median filter
///
/// Each output sample is the median of the `size` input samples centred on it. Near the edges the
/// window is completed by reflecting the series about its end points, so the first and last
/// `size / 2` outputs are medians over partly duplicated samples.
///
/// The output always has the length of the input, and filtering an empty series yields an empty
/// series.
///
/// # Errors
/// Returns [`Error::InvalidParameter`] if `size` is not an odd integer of at least three.
///
/// # Examples
///
/// ```
/// use tian_correction::filter::median_filter;
///
/// let spiky = [1., 1., 9., 1., 1.];
/// let filtered = median_filter(&spiky, 3).unwrap();
/// assert_eq!(filtered, vec![1., 1., 1., 1., 1.]);
/// ```
pub fn median_filter<T: Float>(series: &[T], size: usize) -> Result<Vec<T>> {
    validate_window(size)?;
    let half = isize::try_from(size / 2).expect("window fits in `isize`");

    let mut window = vec![T::zero(); size];
    let filtered = (0..series.len())
        .map(|ii| {
            let centre = isize::try_from(ii).expect("index fits in `isize`");
            for (slot, offset) in window.iter_mut().zip(-half..=half) {
                *slot = series[reflect(centre + offset, series.len())];
            }
            median_in_place(&mut window).expect("window is never empty")
        })
        .collect();

    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_isaac::Isaac64Rng;

    use super::{median_filter, reflect};
    use crate::Error;

    #[test]
    fn reflection_mirrors_about_the_edges() {
        let mapped = (-4..9).map(|ii| reflect(ii, 4)).collect::<Vec<_>>();
        assert_eq!(mapped, vec![3, 2, 1, 0, 0, 1, 2, 3, 3, 2, 1, 0, 0]);
    }

    #[test]
    fn isolated_spikes_are_removed() {
        let mut series = vec![2.0_f64; 50];
        series[10] = 100.;
        series[30] = -40.;

        let filtered = median_filter(&series, 5).unwrap();

        assert_eq!(filtered.len(), series.len());
        assert!(filtered.iter().all(|value| (*value - 2.).abs() < f64::EPSILON));
    }

    #[test]
    fn boundary_windows_use_reflected_samples() {
        let series = [1.0_f64, 5., 2., 8., 3.];
        let filtered = median_filter(&series, 3).unwrap();
        // Left edge window is [1, 1, 5], right edge window is [8, 3, 3]
        assert_eq!(filtered, vec![1., 2., 5., 3., 3.]);
    }

    #[test]
    fn windows_wider_than_the_series_are_defined() {
        let series = [3.0_f64, 1., 2.];
        let filtered = median_filter(&series, 9).unwrap();
        assert_eq!(filtered.len(), 3);
        assert!(filtered.iter().all(|value| (1.0..=3.0).contains(value)));
    }

    #[test]
    fn monotone_series_are_preserved() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let mut series = (0..100).map(|_| rng.gen::<f64>()).collect::<Vec<_>>();
        series.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let filtered = median_filter(&series, 7).unwrap();

        // Reflection at the edges duplicates samples, so only the interior is preserved exactly
        assert_eq!(filtered[3..97], series[3..97]);
    }

    #[test]
    fn even_window_sizes_are_rejected() {
        let series = [1.0_f64; 20];
        assert!(matches!(
            median_filter(&series, 10),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn windows_below_three_are_rejected() {
        let series = [1.0_f64; 20];
        assert!(matches!(
            median_filter(&series, 1),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn empty_series_filter_to_empty_series() {
        let series: [f64; 0] = [];
        assert!(median_filter(&series, 3).unwrap().is_empty());
    }
}
