// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Weighted subspace fitting (WSF) of source directions.

use log::trace;
use ndarray::prelude::*;

use super::steering_matrix;
use crate::{
    c64,
    constants::{SIMPLEX_MAX_ITERATIONS, SIMPLEX_TOLERANCE},
    coord::radec_to_cartesian,
    math::{adjoint, hermitian_eigen, nelder_mead, solve},
};

/// Everything about the data the WSF cost needs, computed once per frame.
struct WsfCost<'a> {
    /// `Es W^(1/2)`: the dominant eigenvectors of the data, weighted.
    weighted_subspace: Array2<c64>,

    /// `trace(W)`.
    weight_sum: f64,

    gains: ArrayView1<'a, c64>,
    positions: ArrayView2<'a, f64>,
    frequency: f64,
}

impl WsfCost<'_> {
    /// `trace((I - P_A) Es W Es^H)` with `A = G T(θ)` and `P_A` the projector
    /// onto the columns of `A`. `θ` holds all the longitudes, then all the
    /// latitudes.
    fn evaluate(&self, theta: &[f64]) -> f64 {
        let directions = directions_from_angles(theta);
        let t = steering_matrix(self.positions, &directions, self.frequency);
        let a = Array2::from_shape_fn(t.dim(), |(i, k)| self.gains[i] * t[(i, k)]);
        let a_h = adjoint(a.view());

        // trace(P_A Es W Es^H) = trace((A^H A)^-1 A^H Es W Es^H A)
        let y = a_h.dot(&self.weighted_subspace);
        let b = y.dot(&adjoint(y.view()));
        match solve(a_h.dot(&a).view(), b.view()) {
            Some(x) => self.weight_sum - x.diag().iter().map(|v| v.re).sum::<f64>(),
            None => f64::INFINITY,
        }
    }
}

/// Longitudes and latitudes (all longitudes first) of unit vectors.
pub fn angles_from_directions(directions: &[[f64; 3]]) -> Vec<f64> {
    let lons = directions.iter().map(|d| d[1].atan2(d[0]));
    let lats = directions.iter().map(|d| d[2].clamp(-1.0, 1.0).asin());
    lons.chain(lats).collect()
}

/// The inverse of [`angles_from_directions`].
pub fn directions_from_angles(theta: &[f64]) -> Vec<[f64; 3]> {
    let (lons, lats) = theta.split_at(theta.len() / 2);
    lons.iter()
        .zip(lats.iter())
        .map(|(&lon, &lat)| radec_to_cartesian(lon, lat))
        .collect()
}

/// Refine source directions by fitting the array response (including the
/// gains) to the signal subspace of the data.
///
/// The `directions.len()` dominant eigenvectors of `data` are weighted by
/// `(λ - σ²)² / λ`, where `σ²` is the mean noise power from the diagonal of
/// `noise`, and the subspace-fitting cost is minimised with a Nelder-Mead
/// simplex starting from `directions`.
pub fn refine_directions<'a>(
    data: ArrayView2<c64>,
    noise: ArrayView2<c64>,
    gains: ArrayView1<'a, c64>,
    positions: ArrayView2<'a, f64>,
    directions: &[[f64; 3]],
    frequency: f64,
) -> Vec<[f64; 3]> {
    let num_sources = directions.len();
    let n = data.len_of(Axis(0));
    if num_sources == 0 || num_sources >= n {
        return directions.to_vec();
    }

    let (values, vectors) = hermitian_eigen(data);
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].abs().total_cmp(&values[a].abs()));

    let mean_noise = noise.diag().iter().map(|v| v.re).sum::<f64>() / n as f64;
    let weights: Vec<f64> = order[..num_sources]
        .iter()
        .map(|&i| {
            let lambda = values[i].abs();
            let w = (lambda - mean_noise).powi(2) / lambda;
            if w.is_finite() {
                w
            } else {
                0.0
            }
        })
        .collect();
    let weighted_subspace = Array2::from_shape_fn((n, num_sources), |(row, k)| {
        vectors[(row, order[k])] * weights[k].sqrt()
    });

    let cost = WsfCost {
        weighted_subspace,
        weight_sum: weights.iter().sum(),
        gains,
        positions,
        frequency,
    };
    let result = nelder_mead(
        |theta| cost.evaluate(theta),
        &angles_from_directions(directions),
        SIMPLEX_TOLERANCE,
        SIMPLEX_MAX_ITERATIONS,
    );
    trace!(
        "WSF: cost {:e} after {} simplex iterations (converged: {})",
        result.cost,
        result.iterations,
        result.converged
    );
    directions_from_angles(&result.x)
}
