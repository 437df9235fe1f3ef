// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The unit of work passed through the processing stages.
//!
//! A [`FrameBuffer`] is the pooled, pre-allocated storage for one
//! polarisation of one correlator frame: the output header and the raw
//! per-channel visibility cube. A pipeline worker owns one [`Frame`], which
//! adds the array correlation matrix (ACM), the flag mask and the flag state;
//! every buffer the worker receives is installed with [`Frame::reset`] and
//! handed back with [`Frame::release`].

mod error;
pub mod header;
#[cfg(test)]
mod tests;

pub use error::HeaderError;
pub use header::{InputHeader, OutputHeader};

use std::fmt;

use itertools::Itertools;
use ndarray::prelude::*;

use crate::{
    c32,
    constants::{
        HEADER_SIZE, MAX_FLAGGED_FRACTION, NUM_ANTENNAS_PER_STATION, NUM_CHANNELS, NUM_STATIONS,
    },
};
use header::{MAX_CHANNELS, MAX_DIPOLES, NUM_OUTPUT_WEIGHTS};

/// The dimensions of the array and of each correlator frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayLayout {
    pub num_stations: usize,
    pub antennas_per_station: usize,

    /// The number of channels delivered per subband.
    pub num_channels: usize,
}

impl Default for ArrayLayout {
    fn default() -> Self {
        ArrayLayout {
            num_stations: NUM_STATIONS,
            antennas_per_station: NUM_ANTENNAS_PER_STATION,
            num_channels: NUM_CHANNELS,
        }
    }
}

impl ArrayLayout {
    /// Check that the layout is non-empty and fits in an output header.
    pub fn validate(&self) -> Result<(), HeaderError> {
        if self.num_stations == 0 || self.antennas_per_station == 0 || self.num_channels == 0 {
            return Err(HeaderError::EmptyLayout {
                num_stations: self.num_stations,
                antennas_per_station: self.antennas_per_station,
                num_channels: self.num_channels,
            });
        }
        if self.num_antennas() > MAX_DIPOLES {
            return Err(HeaderError::TooManyAntennas {
                num_antennas: self.num_antennas(),
                max: MAX_DIPOLES,
            });
        }
        if self.num_channels + 1 > MAX_CHANNELS {
            return Err(HeaderError::TooManyChannels {
                num_channels: self.num_channels + 1,
                max: MAX_CHANNELS,
            });
        }
        if self.num_station_pairs() > NUM_OUTPUT_WEIGHTS {
            return Err(HeaderError::TooManyStationPairs {
                num_pairs: self.num_station_pairs(),
                max: NUM_OUTPUT_WEIGHTS,
            });
        }
        Ok(())
    }

    pub fn num_antennas(&self) -> usize {
        self.num_stations * self.antennas_per_station
    }

    /// The number of baselines, including self correlations.
    pub fn num_baselines(&self) -> usize {
        let n = self.num_antennas();
        n * (n + 1) / 2
    }

    /// The number of station pairs, including each station with itself.
    pub fn num_station_pairs(&self) -> usize {
        self.num_stations * (self.num_stations + 1) / 2
    }

    pub fn station_of(&self, antenna: usize) -> usize {
        antenna / self.antennas_per_station
    }

    /// The index of the baseline between antennas `a1` and `a2` in
    /// lower-triangular order ((0,0), (1,0), (1,1), (2,0), ...). The order of
    /// the antennas doesn't matter.
    pub fn baseline_index(a1: usize, a2: usize) -> usize {
        let (hi, lo) = if a1 >= a2 { (a1, a2) } else { (a2, a1) };
        hi * (hi + 1) / 2 + lo
    }

    /// The index of a station pair, using the same triangular order as
    /// baselines.
    pub fn station_pair_index(s1: usize, s2: usize) -> usize {
        Self::baseline_index(s1, s2)
    }

    /// The number of complex samples per polarisation in a frame.
    pub fn samples_per_polarisation(&self) -> usize {
        self.num_baselines() * self.num_channels
    }

    /// The number of payload bytes following an input header.
    pub fn input_payload_size(&self) -> usize {
        self.samples_per_polarisation() * 2 * std::mem::size_of::<c32>()
    }

    /// The size of a serialised output frame \[bytes\].
    pub fn output_frame_size(&self) -> usize {
        let n = self.num_antennas();
        HEADER_SIZE + n * n * std::mem::size_of::<c32>()
    }
}

/// Pooled storage for one polarisation of one correlator frame.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub header: OutputHeader,

    /// Raw visibilities with shape `(num_baselines, num_channels)`, flattened
    /// baseline-major.
    pub vis: Vec<c32>,
}

impl FrameBuffer {
    pub fn new(layout: &ArrayLayout) -> FrameBuffer {
        FrameBuffer {
            header: OutputHeader::default(),
            vis: vec![c32::default(); layout.samples_per_polarisation()],
        }
    }
}

/// The outcome of calibrating a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    /// Complex gain of each antenna. Flagged antennas have zero gain.
    ///
    /// The gains are solved for on the whitened ACM (each visibility divided
    /// by the square root of its two autocorrelations) and normalised to a unit
    /// mean amplitude, so their phases are the antennas' phases but their
    /// amplitudes are not the antennas' amplitudes.
    pub gains: Array1<c32>,

    /// Fluxes of the sources used for calibration, in catalogue order.
    pub fluxes: Vec<f32>,

    /// Whether the final self-calibration converged within its cycle budget.
    pub converged: bool,

    /// The number of major cycles used by the final self-calibration.
    pub major_cycles: usize,
}

#[derive(Debug)]
pub struct Frame {
    layout: ArrayLayout,

    pub header: OutputHeader,

    /// Raw visibilities, see [`FrameBuffer::vis`].
    pub vis: Vec<c32>,

    /// The array correlation matrix. Hermitian with a real diagonal once the
    /// flagger has run.
    pub acm: Array2<c32>,

    /// 1 on the diagonal; flagged antennas have their whole row and column set
    /// to 1.
    pub mask: Array2<f32>,

    /// Flagged antenna indices, ascending.
    pub flagged: Vec<usize>,

    pub calibration: Option<CalibrationReport>,
}

impl Frame {
    /// A frame without a buffer installed.
    pub fn new(layout: ArrayLayout) -> Frame {
        let n = layout.num_antennas();
        Frame {
            layout,
            header: OutputHeader::default(),
            vis: vec![],
            acm: Array2::zeros((n, n)),
            mask: Array2::eye(n),
            flagged: vec![],
            calibration: None,
        }
    }

    /// Create a frame and install `buffer` into it.
    pub fn from_buffer(layout: ArrayLayout, buffer: FrameBuffer) -> Frame {
        let mut frame = Frame::new(layout);
        frame.reset(buffer);
        frame
    }

    /// Install a new buffer, clearing everything derived from the previous
    /// one.
    pub fn reset(&mut self, buffer: FrameBuffer) {
        debug_assert_eq!(buffer.vis.len(), self.layout.samples_per_polarisation());
        self.header = buffer.header;
        self.vis = buffer.vis;
        self.acm.fill(c32::default());
        self.mask.fill(0.0);
        self.mask.diag_mut().fill(1.0);
        self.flagged.clear();
        self.calibration = None;
    }

    /// Hand the installed buffer back, e.g. to a buffer pool.
    pub fn release(&mut self) -> FrameBuffer {
        FrameBuffer {
            header: std::mem::take(&mut self.header),
            vis: std::mem::take(&mut self.vis),
        }
    }

    pub fn layout(&self) -> &ArrayLayout {
        &self.layout
    }

    pub fn num_antennas(&self) -> usize {
        self.layout.num_antennas()
    }

    /// The raw visibilities as a `(num_baselines, num_channels)` view.
    pub fn vis_view(&self) -> ArrayView2<c32> {
        ArrayView2::from_shape(
            (self.layout.num_baselines(), self.layout.num_channels),
            &self.vis,
        )
        .expect("visibility buffer matches the layout")
    }

    pub fn vis_view_mut(&mut self) -> ArrayViewMut2<c32> {
        ArrayViewMut2::from_shape(
            (self.layout.num_baselines(), self.layout.num_channels),
            &mut self.vis,
        )
        .expect("visibility buffer matches the layout")
    }

    /// A frame is worth calibrating only if fewer than 20% of its antennas
    /// are flagged.
    pub fn is_valid(&self) -> bool {
        (self.flagged.len() as f64 / self.num_antennas() as f64) < MAX_FLAGGED_FRACTION
    }

    pub fn is_flagged(&self, antenna: usize) -> bool {
        self.flagged.binary_search(&antenna).is_ok()
    }

    /// Exclude an antenna from calibration: zero its row and column of the
    /// ACM, set its row and column of the mask and set its header bit.
    pub fn flag_antenna(&mut self, antenna: usize) {
        if let Err(pos) = self.flagged.binary_search(&antenna) {
            self.flagged.insert(pos, antenna);
        }
        self.acm.row_mut(antenna).fill(c32::default());
        self.acm.column_mut(antenna).fill(c32::default());
        self.mask.row_mut(antenna).fill(1.0);
        self.mask.column_mut(antenna).fill(1.0);
        self.header.flag_dipole(antenna);
    }

    /// The header followed by the full ACM (row-major, interleaved real and
    /// imaginary `f32`s), little endian.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.layout.output_frame_size());
        out.extend_from_slice(&self.header.encode());
        for v in self.acm.iter() {
            out.extend_from_slice(&v.re.to_le_bytes());
            out.extend_from_slice(&v.im.to_le_bytes());
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.1} {} {} {} {}",
            self.header.subband,
            self.header.end_time,
            self.header.polarisation_name(),
            self.header.num_flagged_dipoles(),
            self.header.num_flagged_channels(),
            self.header
                .source_fluxes
                .iter()
                .map(|f| format!("{f:.3}"))
                .join(" ")
        )
    }
}
