// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Weighted alternating least squares (WALS) self-calibration.
//!
//! The data are modelled as `R = G A diag(s) A^H G^H + Σn`, where `G` is the
//! diagonal matrix of antenna gains, `A` the array response to each source,
//! `s` the source fluxes and `Σn` the noise covariance. Gains and fluxes are
//! solved for alternately. Only entries where the mask is 1 are fitted; the
//! rest of the data contributes to `Σn`.

use log::trace;
use ndarray::{prelude::*, Zip};

use crate::{
    c64,
    constants::{MAJOR_CYCLE_TOLERANCE, MAX_MAJOR_CYCLES, MAX_MINOR_CYCLES, MINOR_CYCLE_TOLERANCE},
    math::{adjoint, inverse, khatri_rao, pseudo_inverse},
};

#[derive(Debug, Clone)]
pub struct WalsSolution {
    /// Antenna gains `g`, normalised to unit mean amplitude with antenna 0 on
    /// the positive real axis.
    pub gains: Array1<c64>,

    pub fluxes: Array1<f64>,

    /// The residual covariance on the entries excluded from the fit.
    pub noise: Array2<c64>,

    pub converged: bool,

    /// The number of major cycles used.
    pub major_cycles: usize,
}

/// `A diag(s) A^H`.
pub(super) fn model_acm(a: ArrayView2<c64>, fluxes: ArrayView1<f64>) -> Array2<c64> {
    let scaled = Array2::from_shape_fn(a.dim(), |(i, k)| a[(i, k)] * fluxes[k]);
    scaled.dot(&adjoint(a))
}

/// A first guess of the source fluxes by least squares, assuming all gains are
/// 1.
pub fn initial_fluxes(
    a: ArrayView2<c64>,
    data: ArrayView2<c64>,
    mask: ArrayView2<f64>,
) -> Array1<f64> {
    let k = a.len_of(Axis(1));
    let ka = khatri_rao(a, a.mapv(|v| v.conj()).view());
    // |A^H A|^2 is (KA^H KA).
    let aa = adjoint(a).dot(&a).mapv(|v| c64::new(v.norm_sqr(), 0.0));
    let masked = Array1::from_iter(data.iter().zip(mask.iter()).map(|(&d, &m)| d * m));
    let rhs = adjoint(ka.view()).dot(&masked);
    match inverse(aa.view()).or_else(|| pseudo_inverse(aa.view())) {
        Some(inv) => inv.dot(&rhs).mapv(|v| v.re),
        None => Array1::ones(k),
    }
}

/// Solve for the gains `g` in `data ≈ G model G^H`, starting from
/// `initial`. Both matrices should already be masked. This is StEFCal with
/// every second iterate averaged with the one before it.
pub fn gain_solve(
    model: ArrayView2<c64>,
    data: ArrayView2<c64>,
    initial: ArrayView1<c64>,
) -> (Array1<c64>, usize) {
    // Each column of the data, scaled by its squared norm.
    let mut normalised = data.to_owned();
    for mut col in normalised.columns_mut() {
        let norm_sqr: f64 = col.iter().map(|v| v.norm_sqr()).sum();
        if norm_sqr > 0.0 {
            col.mapv_inplace(|v| v / norm_sqr);
        }
    }

    // The estimate for every antenna comes from the previous iterate.
    let mut gains = initial.to_owned();
    let mut next = gains.clone();
    let mut odd = gains.clone();
    let mut iterations = MAX_MINOR_CYCLES;
    for i in 1..=MAX_MINOR_CYCLES {
        for (j, g) in next.iter_mut().enumerate() {
            let est: c64 = normalised
                .column(j)
                .iter()
                .zip(model.column(j).iter())
                .zip(gains.iter())
                .map(|((r, m), g)| r.conj() * g * m)
                .sum();
            if est.norm_sqr() > 0.0 {
                *g = 1.0 / est.conj();
            }
        }

        if i % 2 == 1 {
            odd.assign(&next);
            gains.assign(&next);
        } else {
            gains = (&next + &odd) / 2.0;
            let norm = gains.iter().map(|g| g.norm_sqr()).sum::<f64>().sqrt();
            let delta = gains
                .iter()
                .zip(next.iter())
                .map(|(a, b)| (a - b).norm_sqr())
                .sum::<f64>()
                .sqrt();
            if norm > 0.0 && delta / norm <= MINOR_CYCLE_TOLERANCE {
                iterations = i;
                break;
            }
        }
    }
    (gains, iterations)
}

/// Alternately solve for gains and fluxes.
///
/// `a` is the array response (antennas × sources), `data` the (whitened)
/// ACM, `seed` the starting fluxes and `mask` is 1 for the entries to fit and
/// 0 otherwise.
pub fn wals(
    a: ArrayView2<c64>,
    data: ArrayView2<c64>,
    seed: ArrayView1<f64>,
    mask: ArrayView2<f64>,
) -> WalsSolution {
    let n = data.len_of(Axis(0));
    let k = a.len_of(Axis(1));
    let masked_data = &data * &mask.mapv(|m| c64::new(m, 0.0));
    let selected: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter(|&(_, &m)| m > 0.5)
        .map(|(i, _)| i)
        .collect();
    let flat_data: Vec<c64> = data.iter().copied().collect();

    let mut prev_gains = Array1::from_elem(n, c64::new(0.0, 1.0));
    let mut prev_fluxes = seed.to_owned();
    let mut gains = prev_gains.clone();
    let mut fluxes = prev_fluxes.clone();
    let mut noise = Array2::zeros((n, n));
    let mut converged = false;
    let mut cycles = MAX_MAJOR_CYCLES;

    for cycle in 1..=MAX_MAJOR_CYCLES {
        // Gains.
        let model = model_acm(a, prev_fluxes.view()) * &mask.mapv(|m| c64::new(m, 0.0));
        let (new_gains, minor_cycles) =
            gain_solve(model.view(), masked_data.view(), prev_gains.view());
        gains = new_gains;
        normalise_gains(&mut gains);

        // Fluxes.
        let ga = Array2::from_shape_fn((n, k), |(i, s)| gains[i] * a[(i, s)]);
        let kr = khatri_rao(ga.view(), ga.mapv(|v| v.conj()).view());
        let design = Array2::from_shape_fn((selected.len(), k), |(r, s)| kr[(selected[r], s)]);
        let target = Array1::from_iter(selected.iter().map(|&r| flat_data[r]));
        let design_h = adjoint(design.view());
        fluxes = match pseudo_inverse(design_h.dot(&design).view()) {
            Some(pinv) => pinv.dot(&design_h.dot(&target)).mapv(|v| v.re),
            None => prev_fluxes.clone(),
        };
        if fluxes.iter().any(|f| !f.is_finite()) {
            fluxes.assign(&prev_fluxes);
        }

        // Noise.
        noise = Zip::from(&data)
            .and(&model_acm(ga.view(), fluxes.view()))
            .and(&mask)
            .map_collect(|&d, &m, &w| (d - m) * (1.0 - w));

        // Convergence: how well does the previous parameter vector predict
        // the current one?
        let (dot, norm_sqr) = prev_gains
            .iter()
            .zip(gains.iter())
            .map(|(p, c)| (p.conj() * c, p.norm_sqr()))
            .chain(
                prev_fluxes
                    .iter()
                    .zip(fluxes.iter())
                    .map(|(&p, &c)| (c64::new(p * c, 0.0), p * p)),
            )
            .fold((c64::default(), 0.0), |(d, s), (dd, ss)| (d + dd, s + ss));
        let residual = (dot / norm_sqr - 1.0).norm();
        trace!("WALS cycle {cycle}: {minor_cycles} gain iterations, residual {residual:e}");
        if residual < MAJOR_CYCLE_TOLERANCE {
            converged = true;
            cycles = cycle;
            break;
        }

        prev_gains.assign(&gains);
        prev_fluxes.assign(&fluxes);
    }

    WalsSolution {
        gains,
        fluxes,
        noise,
        converged,
        major_cycles: cycles,
    }
}

/// Scale gains to unit mean amplitude and rotate them so that antenna 0 has
/// zero phase.
pub fn normalise_gains(gains: &mut Array1<c64>) {
    let n = gains.len();
    if n == 0 {
        return;
    }
    let mean_amp = gains.iter().map(|g| g.norm()).sum::<f64>() / n as f64;
    if mean_amp > 0.0 {
        gains.mapv_inplace(|g| g / mean_amp);
    }
    let g0 = gains[0];
    if g0.norm() > 0.0 {
        let phasor = g0 / g0.norm();
        gains.mapv_inplace(|g| g / phasor);
    }
}
