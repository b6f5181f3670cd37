//! Small array routines for interpolating along the energy axis and sizing m/z bins.
use itertools::Itertools;
use num_traits::Float;

/// Piecewise linear interpolation of a single point against the curve `(xp, fp)`.
///
/// `xp` must be increasing. Points left of `xp[0]` take `left`, points right of
/// the last knot take `right`, and a point falling on a knot takes its value.
pub fn interp<T: Float>(x: T, xp: &[T], fp: &[T], left: T, right: T) -> T {
    debug_assert_eq!(xp.len(), fp.len());
    let n = xp.len();
    if n == 0 || x.is_nan() {
        return T::nan();
    }
    if x < xp[0] {
        return left;
    }
    if x > xp[n - 1] {
        return right;
    }
    if x == xp[n - 1] {
        return fp[n - 1];
    }
    // first knot strictly greater than x
    let j = xp.partition_point(|v| *v <= x);
    let (x0, x1) = (xp[j - 1], xp[j]);
    let (y0, y1) = (fp[j - 1], fp[j]);
    if x == x0 {
        return y0;
    }
    let slope = (y1 - y0) / (x1 - x0);
    slope * (x - x0) + y0
}

/// Sorted, de-duplicated copy of `values`
pub fn unique_sorted(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out.dedup();
    out
}

/// The smallest gap between consecutive values of an increasing sequence
pub fn min_gap(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .tuple_windows()
        .map(|(a, b)| b - a)
        .min_by(|a, b| a.total_cmp(b))
}
