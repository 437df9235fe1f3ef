// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod calibrate;
mod stream;

use ndarray::prelude::*;

use rtcal::{
    c32, c64,
    coord::{subband_to_frequency, unix_to_epoch},
    frame::InputHeader,
    stages::calibrate::{sources::visible_sources, steering_matrix},
    AntennaPositions, ArrayLayout, Frame, FrameBuffer, OutputHeader,
};

/// Roughly the ITRF position of the array centre \[metres\].
const ARRAY_CENTRE: [f64; 3] = [3_826_577.0, 461_022.0, 5_064_892.0];

/// A fixed time for synthetic frames (2023-11-14T22:13:20 UTC).
const UNIX_TIME: f64 = 1_700_000_000.0;

const SUBBAND: i32 = 300;

/// Three stations of sixteen antennas, spread over a few hundred metres.
fn layout() -> ArrayLayout {
    ArrayLayout {
        num_stations: 3,
        antennas_per_station: 16,
        num_channels: 4,
    }
}

fn positions(layout: &ArrayLayout) -> AntennaPositions {
    let station_offsets = [[0.0, 0.0, 0.0], [140.0, -90.0, -30.0], [-60.0, 160.0, 25.0]];
    let itrf = Array2::from_shape_fn((layout.num_antennas(), 3), |(a, c)| {
        let station = layout.station_of(a);
        // A spiral within each station.
        let k = (a % layout.antennas_per_station) as f64;
        let radius = 3.0 + 2.2 * k;
        let angle = 2.4 * k + station as f64;
        let local = [
            radius * angle.cos(),
            radius * angle.sin(),
            0.3 * radius * (angle * 0.5).sin(),
        ];
        ARRAY_CENTRE[c] + station_offsets[station][c] + local[c]
    });
    AntennaPositions::from_itrf(itrf)
}

/// Gains with phase errors up to 0.3 radians and amplitude errors of 5%.
fn true_gains(n: usize) -> Array1<c64> {
    Array1::from_shape_fn(n, |a| {
        let a = a as f64;
        c64::from_polar(1.0 + 0.05 * (0.9 * a).cos(), 0.3 * (1.7 * a).sin())
    })
}

/// The fluxes given to the visible sources, brightest first.
fn true_fluxes(num_sources: usize) -> Vec<f64> {
    (0..num_sources).map(|k| 10.0 * 0.8_f64.powi(k as i32)).collect()
}

/// `G A diag(s) A^H G^H` plus uncorrelated noise on the diagonal, for the
/// sources visible at [`UNIX_TIME`].
fn simulate_acm(positions: &AntennaPositions, gains: &Array1<c64>) -> Array2<c64> {
    let epoch = unix_to_epoch(UNIX_TIME);
    let directions: Vec<[f64; 3]> = visible_sources(epoch).into_iter().map(|(_, d)| d).collect();
    let fluxes = true_fluxes(directions.len());

    let itrf = positions.itrf();
    let centre = itrf.mean_axis(Axis(0)).unwrap();
    let local = &itrf - &centre;
    let a = steering_matrix(local.view(), &directions, subband_to_frequency(SUBBAND as usize));

    let n = positions.num_antennas();
    Array2::from_shape_fn((n, n), |(i, j)| {
        let sky: c64 = (0..directions.len())
            .map(|k| a[(i, k)] * a[(j, k)].conj() * fluxes[k])
            .sum();
        let noise = if i == j { 5.0 } else { 0.0 };
        gains[i] * sky * gains[j].conj() + noise
    })
}

/// One polarisation of a correlator frame holding `acm` in every channel.
fn frame_buffer(layout: &ArrayLayout, acm: &Array2<c64>) -> FrameBuffer {
    let input = InputHeader {
        start_time: UNIX_TIME - 0.5,
        end_time: UNIX_TIME + 0.5,
        ..Default::default()
    };
    let mut buffer = FrameBuffer::new(layout);
    buffer.header = OutputHeader::from_input(
        &input,
        SUBBAND,
        layout.num_antennas(),
        layout.num_channels,
        0,
    );
    let mut vis = ArrayViewMut2::from_shape(
        (layout.num_baselines(), layout.num_channels),
        &mut buffer.vis,
    )
    .unwrap();
    for a1 in 0..layout.num_antennas() {
        for a2 in 0..=a1 {
            let v = acm[(a1, a2)];
            vis.row_mut(ArrayLayout::baseline_index(a1, a2))
                .fill(c32::new(v.re as f32, v.im as f32));
        }
    }
    buffer
}

fn synthetic_frame() -> (Frame, Array1<c64>) {
    let layout = layout();
    let positions = positions(&layout);
    let gains = true_gains(layout.num_antennas());
    let acm = simulate_acm(&positions, &gains);
    let frame = Frame::from_buffer(layout, frame_buffer(&layout, &acm));
    (frame, gains)
}
