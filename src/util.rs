/**
 * File: /src/util.rs
 * Created Date: Tuesday, June 10th 2025
 * Author: Zihan
 * -----
 * Last Modified: Saturday, 5th July 2025 9:21:48 am
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
**/
use chrono::Local;

pub fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Quantile of the finite values in `values` with linear interpolation
/// between order statistics (numpy's default). NaN when no finite value
/// exists.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let q = q.clamp(0.0, 1.0);
    let pos = q * (finite.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        finite[lo]
    } else {
        let frac = pos - lo as f64;
        finite[lo] * (1.0 - frac) + finite[hi] * frac
    }
}

/// Indices of the `n` largest values, descending. Ties resolve to the
/// smaller index so the ordering is stable across runs.
pub fn top_n_order(values: &[f64], n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    order.truncate(n);
    order
}

/// Mean of the finite values; NaN when there are none.
pub fn finite_mean(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.iter().sum::<f64>() / finite.len() as f64
}

/// Sample standard deviation of the finite values; NaN when fewer than
/// two finite values exist.
pub fn finite_stddev(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return f64::NAN;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (finite.len() - 1) as f64;
    var.sqrt()
}

/// Piecewise-linear interpolation of `x` against the sample points
/// `(xs, ys)`. `xs` must be ascending; values outside the range clamp to
/// the edge samples.
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    if xs.is_empty() {
        return f64::NAN;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    let idx = xs.partition_point(|&xv| xv < x);
    let (x0, x1) = (xs[idx - 1], xs[idx]);
    let (y0, y1) = (ys[idx - 1], ys[idx]);
    if x1 == x0 {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}
