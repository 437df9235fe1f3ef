// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scaling visibilities by the correlator's per-station-pair weights.

use log::trace;

use crate::{
    c32,
    frame::{ArrayLayout, Frame},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Weighter;

impl Weighter {
    /// Scale the visibilities of each baseline by the weight of its station
    /// pair, relative to the largest weight. Nothing happens if all weights
    /// are zero (the correlator doesn't provide them).
    pub fn run(&self, frame: &mut Frame) {
        let layout = *frame.layout();
        let weights = &frame.header.weights[..layout.num_station_pairs()];
        let max = weights.iter().copied().max().unwrap_or(0);
        if max == 0 {
            trace!("No station-pair weights; not weighting");
            return;
        }

        let scales: Vec<f32> = weights
            .iter()
            .map(|&w| w as f32 / max as f32)
            .collect();
        let n = layout.num_antennas();
        let baselines = (0..n).flat_map(|a1| (0..=a1).map(move |a2| (a1, a2)));
        for (mut channels, (a1, a2)) in frame.vis_view_mut().outer_iter_mut().zip(baselines) {
            let pair = ArrayLayout::station_pair_index(layout.station_of(a1), layout.station_of(a2));
            let scale = scales[pair];
            if scale != 1.0 {
                channels.mapv_inplace(|v: c32| v * scale);
            }
        }
    }
}
