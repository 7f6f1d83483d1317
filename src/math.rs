use std::cmp::Ordering;

use itertools::Itertools;
use ndarray::Array1;
use num_traits::Float;

use crate::{Error, Result};

/// Estimate the derivative of `y` with respect to `x` on a non-uniform grid
///
/// Interior samples use the second-order accurate three-point formula
/// $$
///     y'_i \approx \frac{h_{i-1}^2 y_{i+1} - h_i^2 y_{i-1} + (h_i^2 - h_{i-1}^2) y_i}
///         {h_{i-1} h_i (h_{i-1} + h_i)}
/// $$
/// with $h_i = x_{i+1} - x_i$. The first and last sample fall back to one-sided first-order
/// differences, so the edges are less accurate than the interior.
///
/// Series with fewer than two samples have no defined slope and produce zeros.
///
/// # Panics
/// If `y` and `x` differ in length.
///
/// # Examples
///
/// ```
/// use tian_correction::math::gradient;
///
/// let x = [0., 1., 3., 4.];
/// let y = x.map(|x| 2. * x + 1.);
/// let dy = gradient(&y, &x);
///
/// for slope in dy {
///     approx::assert_relative_eq!(slope, 2.);
/// }
/// ```
pub fn gradient<T: Float>(y: &[T], x: &[T]) -> Vec<T> {
    assert_eq!(y.len(), x.len(), "gradient requires matching lengths");
    let n = y.len();
    if n < 2 {
        return vec![T::zero(); n];
    }

    let mut dy = Vec::with_capacity(n);
    dy.push((y[1] - y[0]) / (x[1] - x[0]));
    for ((x0, x1, x2), (y0, y1, y2)) in x
        .iter()
        .tuple_windows()
        .zip(y.iter().tuple_windows())
    {
        let h_prev = *x1 - *x0;
        let h_next = *x2 - *x1;
        let numerator = h_prev * h_prev * *y2 - h_next * h_next * *y0
            + (h_next * h_next - h_prev * h_prev) * *y1;
        dy.push(numerator / (h_prev * h_next * (h_prev + h_next)));
    }
    dy.push((y[n - 1] - y[n - 2]) / (x[n - 1] - x[n - 2]));
    dy
}

/// Median of `values`, reordering the slice in the process
///
/// Even-length slices return the mean of the two central values. Returns `None` for an empty
/// slice.
pub fn median_in_place<T: Float>(values: &mut [T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    let compare = |a: &T, b: &T| a.partial_cmp(b).unwrap_or(Ordering::Equal);
    let mid = values.len() / 2;
    let is_even = values.len() % 2 == 0;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, compare);
    let upper = *upper;

    if is_even {
        let lower_max = lower
            .iter()
            .copied()
            .max_by(compare)
            .unwrap_or(upper);
        let two = T::one() + T::one();
        Some((lower_max + upper) / two)
    } else {
        Some(upper)
    }
}

/// Solve the symmetric positive-definite pentadiagonal system $A x = r$
///
/// The matrix is passed in band form: `diag[i] = A[i, i]`, `first[i] = A[i, i + 1]` and
/// `second[i] = A[i, i + 2]`. Trailing entries of the off-diagonals beyond the matrix are
/// ignored. The system is factorised as $L D L^T$ with unit lower-triangular $L$ of bandwidth
/// two, which costs O(n).
///
/// # Errors
/// Returns [`Error::Solver`] if a pivot is not strictly positive, which means the matrix is not
/// positive definite.
pub fn solve_pentadiagonal(
    diag: &Array1<f64>,
    first: &Array1<f64>,
    second: &Array1<f64>,
    rhs: &Array1<f64>,
) -> Result<Array1<f64>> {
    let n = diag.len();
    assert_eq!(rhs.len(), n, "right hand side must match the matrix dimension");
    assert!(first.len() + 1 >= n && second.len() + 2 >= n);

    let mut d = Array1::<f64>::zeros(n);
    let mut l1 = Array1::<f64>::zeros(n);
    let mut l2 = Array1::<f64>::zeros(n);

    for ii in 0..n {
        let mut pivot = diag[ii];
        if ii >= 1 {
            pivot -= l1[ii - 1] * l1[ii - 1] * d[ii - 1];
        }
        if ii >= 2 {
            pivot -= l2[ii - 2] * l2[ii - 2] * d[ii - 2];
        }
        if !(pivot.is_finite() && pivot > 0.0) {
            return Err(Error::Solver(format!(
                "pentadiagonal system is not positive definite (pivot {pivot} at row {ii})"
            )));
        }
        d[ii] = pivot;

        if ii + 1 < n {
            let mut coupling = first[ii];
            if ii >= 1 {
                coupling -= l1[ii - 1] * d[ii - 1] * l2[ii - 1];
            }
            l1[ii] = coupling / pivot;
        }
        if ii + 2 < n {
            l2[ii] = second[ii] / pivot;
        }
    }

    // Forward substitution with L, then scale by D
    let mut z = Array1::<f64>::zeros(n);
    for ii in 0..n {
        let mut value = rhs[ii];
        if ii >= 1 {
            value -= l1[ii - 1] * z[ii - 1];
        }
        if ii >= 2 {
            value -= l2[ii - 2] * z[ii - 2];
        }
        z[ii] = value;
    }
    let mut x = &z / &d;

    // Back substitution with L^T
    for ii in (0..n).rev() {
        if ii + 1 < n {
            x[ii] -= l1[ii] * x[ii + 1];
        }
        if ii + 2 < n {
            x[ii] -= l2[ii] * x[ii + 2];
        }
    }

    Ok(x)
}
