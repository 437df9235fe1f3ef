// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Self-calibration against the brightest sources in the sky.
//!
//! For every valid frame:
//! 1. the unflagged part of the ACM is whitened;
//! 2. the catalogue sources above the horizon are selected;
//! 3. gains and fluxes are solved for with WALS ([`wals`]);
//! 4. faint sources are dropped and the directions of the rest refined with
//!    WSF ([`wsf`]);
//! 5. gains and fluxes are solved for again at the refined directions;
//! 6. the data are corrected for the gains, and the noise estimate and the
//!    modelled sources are subtracted.
//!
//! Calibration is done in double precision; only the results are single
//! precision.

pub mod sources;
pub mod wals;
pub mod wsf;

pub use sources::BrightSource;

use std::sync::Arc;

use log::{debug, warn};
use ndarray::{prelude::*, Zip};

use crate::{
    antenna::AntennaPositions,
    c32, c64,
    constants::{MAX_BASELINE_CUTOFF_M, MIN_BASELINE_WAVELENGTHS, MIN_RELATIVE_FLUX, TAU, VEL_C},
    coord::{subband_to_frequency, unix_to_epoch},
    frame::{CalibrationReport, Frame},
    math::zero_non_finite,
};
use wals::{initial_fluxes, model_acm, wals};

/// The response of every antenna (rows) to a unit source in every direction
/// (columns): `exp(-2πi f/c p·s)`.
pub fn steering_matrix(
    positions: ArrayView2<f64>,
    directions: &[[f64; 3]],
    frequency: f64,
) -> Array2<c64> {
    let k = -TAU * frequency / VEL_C;
    Array2::from_shape_fn((positions.len_of(Axis(0)), directions.len()), |(i, s)| {
        let d = &directions[s];
        let delay =
            positions[(i, 0)] * d[0] + positions[(i, 1)] * d[1] + positions[(i, 2)] * d[2];
        c64::from_polar(1.0, k * delay)
    })
}

#[derive(Debug, Clone)]
pub struct Calibrator {
    positions: Arc<AntennaPositions>,
}

impl Calibrator {
    pub fn new(positions: Arc<AntennaPositions>) -> Calibrator {
        Calibrator { positions }
    }

    pub fn run(&self, frame: &mut Frame) {
        if !frame.is_valid() {
            debug!(
                "Not calibrating; {} of {} antennas are flagged",
                frame.flagged.len(),
                frame.num_antennas()
            );
            return;
        }

        let frequency = subband_to_frequency(frame.header.subband.max(0) as usize);
        let epoch = unix_to_epoch(frame.header.central_time());
        let cutoff = (MIN_BASELINE_WAVELENGTHS * VEL_C / frequency).min(MAX_BASELINE_CUTOFF_M);

        // Only the unflagged antennas take part.
        let unflagged: Vec<usize> = (0..frame.num_antennas())
            .filter(|&a| !frame.is_flagged(a))
            .collect();
        let n = unflagged.len();
        let mut data = Array2::from_shape_fn((n, n), |(i, j)| {
            let v = frame.acm[(unflagged[i], unflagged[j])];
            c64::new(f64::from(v.re), f64::from(v.im))
        });
        let lengths = self.positions.baseline_lengths();
        let mask = Array2::from_shape_fn((n, n), |(i, j)| {
            let (a1, a2) = (unflagged[i], unflagged[j]);
            let flagged = f64::from(frame.mask[(a1, a2)]);
            let too_short = if lengths[(a1, a2)] < cutoff { 1.0 } else { 0.0 };
            1.0 - flagged.max(too_short)
        });
        // Positions relative to the array centre keep the phases small.
        let itrf = self.positions.itrf();
        let centre = itrf.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(3));
        let positions =
            Array2::from_shape_fn((n, 3), |(i, c)| itrf[(unflagged[i], c)] - centre[c]);

        // Whiten.
        let power: Vec<f64> = data.diag().iter().map(|v| v.re).collect();
        data.indexed_iter_mut()
            .for_each(|((i, j), v)| *v /= (power[i] * power[j]).sqrt());
        zero_non_finite(&mut data);

        // Select the sources.
        let visible = sources::visible_sources(epoch);
        if visible.is_empty() {
            debug!("No bright sources above the horizon; not calibrating");
            return;
        }
        for (source, _) in &visible {
            frame.header.set_source_active(source.index(), true);
        }
        let directions: Vec<[f64; 3]> = visible.iter().map(|(_, d)| *d).collect();

        // Initial calibration.
        let a = steering_matrix(positions.view(), &directions, frequency);
        let seed = initial_fluxes(a.view(), data.view(), mask.view());
        let initial = wals(a.view(), data.view(), seed.view(), mask.view());
        if !initial.converged {
            warn!(
                "Subband {} {}: initial calibration did not converge after {} cycles",
                frame.header.subband,
                frame.header.polarisation_name(),
                initial.major_cycles
            );
            frame.header.active_sources = 0;
            frame.calibration = Some(report(
                frame.num_antennas(),
                &unflagged,
                &initial.gains,
                &[],
                false,
                initial.major_cycles,
            ));
            return;
        }

        // Drop the faint sources.
        let threshold = initial.fluxes[0] * f64::from(MIN_RELATIVE_FLUX);
        let mut kept = vec![];
        for (k, (source, direction)) in visible.iter().enumerate() {
            if initial.fluxes[k] > threshold {
                kept.push((*source, *direction, initial.fluxes[k]));
            } else {
                frame.header.set_source_active(source.index(), false);
            }
        }
        if kept.is_empty() {
            warn!("No bright source is bright enough to calibrate with");
            frame.calibration = Some(report(
                frame.num_antennas(),
                &unflagged,
                &initial.gains,
                &[],
                true,
                initial.major_cycles,
            ));
            return;
        }

        // Refine the directions.
        let directions: Vec<[f64; 3]> = kept.iter().map(|(_, d, _)| *d).collect();
        let directions = wsf::refine_directions(
            data.view(),
            initial.noise.view(),
            initial.gains.view(),
            positions.view(),
            &directions,
            frequency,
        );

        // Final calibration.
        let a = steering_matrix(positions.view(), &directions, frequency);
        let seed = Array1::from_iter(kept.iter().map(|(_, _, f)| *f));
        let last = wals(a.view(), data.view(), seed.view(), mask.view());
        if !last.converged {
            warn!(
                "Subband {} {}: final calibration did not converge after {} cycles",
                frame.header.subband,
                frame.header.polarisation_name(),
                last.major_cycles
            );
        }

        // Correct the gains, subtract the noise and the sources.
        let inv_gains = last.gains.mapv(|g| {
            if g.norm_sqr() > 0.0 {
                1.0 / g
            } else {
                c64::default()
            }
        });
        let model = model_acm(a.view(), last.fluxes.view());
        Zip::indexed(&mut data)
            .and(&last.noise)
            .and(&model)
            .for_each(|(i, j), v, &noise, &m| {
                *v = inv_gains[i] * inv_gains[j].conj() * (*v - noise) - m;
            });

        for ((source, _, _), &flux) in kept.iter().zip(last.fluxes.iter()) {
            frame.header.source_fluxes[source.index()] = flux as f32;
        }

        // Scatter back.
        for (i, &a1) in unflagged.iter().enumerate() {
            for (j, &a2) in unflagged.iter().enumerate() {
                let v = data[(i, j)];
                frame.acm[(a1, a2)] = c32::new(v.re as f32, v.im as f32);
            }
        }

        frame.calibration = Some(report(
            frame.num_antennas(),
            &unflagged,
            &last.gains,
            last.fluxes.as_slice().unwrap_or_default(),
            last.converged,
            last.major_cycles,
        ));
    }
}

/// Gains of the unflagged antennas are scattered into an array covering all
/// antennas.
fn report(
    num_antennas: usize,
    unflagged: &[usize],
    gains: &Array1<c64>,
    fluxes: &[f64],
    converged: bool,
    major_cycles: usize,
) -> CalibrationReport {
    let mut full_gains = Array1::zeros(num_antennas);
    for (&a, g) in unflagged.iter().zip(gains.iter()) {
        full_gains[a] = c32::new(g.re as f32, g.im as f32);
    }
    CalibrationReport {
        gains: full_gains,
        fluxes: fluxes.iter().map(|&f| f as f32).collect(),
        converged,
        major_cycles,
    }
}
