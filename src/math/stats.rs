// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Robust statistics used to find bad channels and antennas.

use crate::constants::MAX_SIGMA_CLIP_ITERATIONS;

/// The exact median of `values`, found by partially ordering the slice in
/// place. For an even number of values, the two middle values are averaged.
/// The median of nothing is NaN.
pub fn median(values: &mut [f32]) -> f32 {
    let n = values.len();
    if n == 0 {
        return f32::NAN;
    }
    let h = n / 2;
    let (lower, &mut middle, _) = values.select_nth_unstable_by(h, f32::total_cmp);
    if n % 2 == 1 {
        middle
    } else {
        // Everything below the pivot is no larger than it; the largest of
        // those is the other middle value.
        let below = lower.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        (middle + below) * 0.5
    }
}

/// The population standard deviation of `values`.
pub fn sigma(values: &[f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt() as f32
}

/// Iteratively reject outliers from `data`.
///
/// `keep` must be the same length as `data`; entries that are `false` are
/// ignored and never come back. Each iteration computes the median and
/// standard deviation of the kept entries and rejects any kept entry strictly
/// outside `[median - n_sigma * sigma, median + n_sigma * sigma]`. Iteration
/// stops once an iteration rejects nothing, or nothing is left, or after
/// [`MAX_SIGMA_CLIP_ITERATIONS`]. The number of iterations used is returned.
pub fn sigma_clip(data: &[f32], keep: &mut [bool], n_sigma: f32) -> usize {
    debug_assert_eq!(data.len(), keep.len());

    let mut remaining = Vec::with_capacity(data.len());
    for iteration in 1..=MAX_SIGMA_CLIP_ITERATIONS {
        remaining.clear();
        remaining.extend(
            data.iter()
                .zip(keep.iter())
                .filter(|(_, &k)| k)
                .map(|(&d, _)| d),
        );
        if remaining.is_empty() {
            return iteration;
        }

        let sd = sigma(&remaining);
        let med = median(&mut remaining);
        let (low, high) = (med - n_sigma * sd, med + n_sigma * sd);

        let mut changed = false;
        for (&d, k) in data.iter().zip(keep.iter_mut()) {
            if *k && (d < low || d > high) {
                *k = false;
                changed = true;
            }
        }
        if !changed {
            return iteration;
        }
    }

    MAX_SIGMA_CLIP_ITERATIONS
}
