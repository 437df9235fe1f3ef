// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Finding bad channels and antennas, and averaging the good channels into the
//! array correlation matrix.

use std::fmt;

use log::{debug, trace};
use ndarray::{prelude::*, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    c32,
    constants::DEAD_ANTENNA_THRESHOLD,
    frame::{ArrayLayout, Frame},
    math::sigma_clip,
};

/// An inclusive range of channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelRange {
    pub start: usize,
    pub end: usize,
}

impl ChannelRange {
    pub fn contains(&self, channel: usize) -> bool {
        (self.start..=self.end).contains(&channel)
    }
}

impl fmt::Display for ChannelRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone)]
pub struct Flagger {
    ant_sigma: f32,
    vis_sigma: f32,

    /// Whether each channel was asked for.
    selected_channels: Vec<bool>,
}

impl Flagger {
    pub fn new(
        ant_sigma: f32,
        vis_sigma: f32,
        channels: &[ChannelRange],
        layout: &ArrayLayout,
    ) -> Flagger {
        let selected_channels = (0..layout.num_channels)
            .map(|ch| channels.iter().any(|r| r.contains(ch)))
            .collect();
        Flagger {
            ant_sigma,
            vis_sigma,
            selected_channels,
        }
    }

    pub fn run(&self, frame: &mut Frame) {
        let layout = *frame.layout();
        let n = layout.num_antennas();

        // Find the bad channels.
        let power = channel_power(frame.vis_view());
        let mut keep_channels = self.selected_channels.clone();
        sigma_clip(&power, &mut keep_channels, self.vis_sigma);
        for (ch, _) in keep_channels.iter().enumerate().filter(|&(_, &k)| !k) {
            // Channel 0 of the subband is never delivered, so delivered channel
            // `ch` is subband channel `ch + 1`.
            frame.header.flag_channel(ch + 1);
        }

        // Average the good channels of each baseline.
        let mut averaged = Array1::zeros(layout.num_baselines());
        let num_kept = keep_channels.iter().filter(|&&k| k).count() as f32;
        Zip::from(&mut averaged)
            .and(frame.vis_view().rows())
            .par_for_each(|avg: &mut c32, channels| {
                let sum = channels
                    .iter()
                    .zip(keep_channels.iter())
                    .filter(|&(_, &k)| k)
                    .fold(c32::default(), |acc, (v, _)| acc + v);
                *avg = sum / num_kept;
            });

        // Build the Hermitian ACM from the lower triangle.
        let mut bl = 0;
        for i in 0..n {
            for j in 0..=i {
                let mut v = averaged[bl];
                if v.is_nan() {
                    v = c32::default();
                }
                if i == j {
                    frame.acm[(i, i)] = c32::new(v.re, 0.0);
                } else {
                    frame.acm[(i, j)] = v;
                    frame.acm[(j, i)] = v.conj();
                }
                bl += 1;
            }
        }

        // Find the bad antennas.
        let antenna_power: Vec<f32> = frame
            .acm
            .axis_iter(Axis(1))
            .map(|col| col.iter().map(|v| v.norm()).sum::<f32>() / n as f32)
            .collect();
        let mut keep_antennas: Vec<bool> = antenna_power
            .iter()
            .enumerate()
            .map(|(a, &p)| p > DEAD_ANTENNA_THRESHOLD && !frame.is_flagged(a))
            .collect();
        let num_dead = keep_antennas.iter().filter(|&&k| !k).count();
        let iterations = sigma_clip(&antenna_power, &mut keep_antennas, self.ant_sigma);
        trace!("Antenna sigma clipping took {iterations} iterations");
        for (a, _) in keep_antennas.iter().enumerate().filter(|&(_, &k)| !k) {
            frame.flag_antenna(a);
        }

        debug!(
            "Flagged {} channels; {} dead and {} outlying antennas",
            keep_channels.iter().filter(|&&k| !k).count(),
            num_dead,
            frame.flagged.len() - num_dead
        );
    }
}

/// The mean visibility amplitude of each channel over all baselines.
fn channel_power(vis: ArrayView2<c32>) -> Vec<f32> {
    let (num_baselines, num_channels) = vis.dim();
    let sums = vis
        .axis_iter(Axis(0))
        .into_par_iter()
        .fold(
            || vec![0.0_f64; num_channels],
            |mut acc, channels| {
                acc.iter_mut()
                    .zip(channels.iter())
                    .for_each(|(a, v)| *a += f64::from(v.norm()));
                acc
            },
        )
        .reduce(
            || vec![0.0_f64; num_channels],
            |mut a, b| {
                a.iter_mut().zip(b).for_each(|(a, b)| *a += b);
                a
            },
        );
    sums.into_iter()
        .map(|s| (s / num_baselines as f64) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::frame::FrameBuffer;

    fn layout() -> ArrayLayout {
        ArrayLayout {
            num_stations: 3,
            antennas_per_station: 8,
            num_channels: 8,
        }
    }

    /// A frame where every baseline (a1, a2) has the visibility
    /// `(1 + 0.01 a1 + 0.02 a2) e^{i 0.1 (a1 - a2)}` in every channel.
    fn frame() -> Frame {
        let layout = layout();
        let mut buffer = FrameBuffer::new(&layout);
        let n = layout.num_antennas();
        let mut vis = ArrayViewMut2::from_shape(
            (layout.num_baselines(), layout.num_channels),
            &mut buffer.vis,
        )
        .unwrap();
        for a1 in 0..n {
            for a2 in 0..=a1 {
                let amp = 1.0 + 0.01 * a1 as f32 + 0.02 * a2 as f32;
                let v = c32::from_polar(amp, 0.1 * (a1 as f32 - a2 as f32));
                vis.row_mut(ArrayLayout::baseline_index(a1, a2)).fill(v);
            }
        }
        Frame::from_buffer(layout, buffer)
    }

    fn all_channels() -> Vec<ChannelRange> {
        vec![ChannelRange { start: 0, end: 7 }]
    }

    fn assert_hermitian(acm: &Array2<c32>) {
        for ((i, j), v) in acm.indexed_iter() {
            assert_abs_diff_eq!(*v, acm[(j, i)].conj());
            if i == j {
                assert_abs_diff_eq!(v.im, 0.0);
            }
        }
    }

    #[test]
    fn test_clean_frame() {
        let mut frame = frame();
        let flagger = Flagger::new(4.0, 3.0, &all_channels(), &layout());
        flagger.run(&mut frame);

        assert!(frame.flagged.is_empty());
        assert_eq!(frame.header.num_flagged_channels(), 0);
        assert_hermitian(&frame.acm);
        let expected = c32::from_polar(1.0 + 0.05 + 0.04, 0.3);
        assert_abs_diff_eq!(frame.acm[(5, 2)], expected, epsilon = 1e-6);
        assert_abs_diff_eq!(frame.acm[(2, 5)], expected.conj(), epsilon = 1e-6);
        assert_abs_diff_eq!(frame.acm[(3, 3)].re, 1.0 + 0.03 + 0.06, epsilon = 1e-6);
    }

    #[test]
    fn test_rfi_channel_is_flagged_and_excluded() {
        let mut frame = frame();
        // Channel 3 is full of interference.
        for mut row in frame.vis_view_mut().rows_mut() {
            row[3] = c32::new(500.0, 500.0);
        }
        let flagger = Flagger::new(4.0, 3.0, &all_channels(), &layout());
        flagger.run(&mut frame);

        assert!(frame.header.is_channel_flagged(4));
        assert_eq!(frame.header.num_flagged_channels(), 1);
        assert!(frame.flagged.is_empty());
        let expected = c32::from_polar(1.0 + 0.05 + 0.04, 0.3);
        assert_abs_diff_eq!(frame.acm[(5, 2)], expected, epsilon = 1e-5);
    }

    #[test]
    fn test_unselected_channels_are_flagged() {
        let mut frame = frame();
        let channels = [
            ChannelRange { start: 0, end: 1 },
            ChannelRange { start: 5, end: 7 },
        ];
        let flagger = Flagger::new(4.0, 3.0, &channels, &layout());
        flagger.run(&mut frame);
        for ch in 2..=4 {
            assert!(frame.header.is_channel_flagged(ch + 1));
        }
        assert_eq!(frame.header.num_flagged_channels(), 3);
        assert!(frame.flagged.is_empty());
    }

    #[test]
    fn test_no_channels_gives_zero_acm() {
        let mut frame = frame();
        let channels = [ChannelRange { start: 100, end: 200 }];
        let flagger = Flagger::new(4.0, 3.0, &channels, &layout());
        flagger.run(&mut frame);
        assert_eq!(frame.header.num_flagged_channels(), 8);
        assert!(frame.acm.iter().all(|v| *v == c32::default()));
        // Everything is dead.
        assert_eq!(frame.flagged, (0..24).collect::<Vec<_>>());
        assert!(!frame.is_valid());
    }

    #[test]
    fn test_dead_and_hot_antennas() {
        let mut frame = frame();
        let n = layout().num_antennas();
        {
            let mut vis = frame.vis_view_mut();
            for a in 0..n {
                // Antenna 4 is dead, antenna 9 is very loud.
                vis.row_mut(ArrayLayout::baseline_index(4, a)).fill(c32::default());
                vis.row_mut(ArrayLayout::baseline_index(9, a))
                    .mapv_inplace(|v| v * 1000.0);
            }
        }
        let flagger = Flagger::new(4.0, 3.0, &all_channels(), &layout());
        flagger.run(&mut frame);

        assert_eq!(frame.flagged, vec![4, 9]);
        assert!(frame.header.is_dipole_flagged(4));
        assert!(frame.header.is_dipole_flagged(9));
        assert_eq!(frame.header.num_flagged_dipoles(), 2);
        for i in 0..n {
            assert_eq!(frame.acm[(9, i)], c32::default());
            assert_eq!(frame.acm[(i, 4)], c32::default());
            assert_abs_diff_eq!(frame.mask[(i, 9)], 1.0);
        }
        assert_hermitian(&frame.acm);
    }

    #[test]
    fn test_channel_range() {
        let r = ChannelRange { start: 3, end: 5 };
        assert!(!r.contains(2));
        assert!(r.contains(3));
        assert!(r.contains(5));
        assert!(!r.contains(6));
        assert_eq!(r.to_string(), "3-5");
    }
}
