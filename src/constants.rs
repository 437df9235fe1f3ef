// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

Geometry and time constants are double precision. Gains and fluxes are
single precision, but are computed in double precision where possible.
 */

pub use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Speed of light \[metres/second\].
pub const VEL_C: f64 = 299_792_458.0;

/// The number of polarisations interleaved in a correlator stream.
pub const NUM_POLARISATIONS: usize = 2;

/// The number of stations in the array.
pub const NUM_STATIONS: usize = 6;

/// The number of dipoles per station. Only half of them are active.
pub const NUM_DIPOLES_PER_STATION: usize = 96;

/// The number of active antennas per station.
pub const NUM_ANTENNAS_PER_STATION: usize = NUM_DIPOLES_PER_STATION / 2;

/// The number of active antennas in the array.
pub const NUM_ANTENNAS: usize = NUM_STATIONS * NUM_ANTENNAS_PER_STATION;

/// The number of frequency channels delivered per subband (the first channel of
/// a subband is never delivered).
pub const NUM_CHANNELS: usize = 63;

/// The number of baselines including self correlations.
pub const NUM_BASELINES: usize = NUM_ANTENNAS * (NUM_ANTENNAS + 1) / 2;

/// The sampling clock of the receivers \[Hz\].
pub const SAMPLE_CLOCK_HZ: f64 = 2e8;

/// The number of subbands produced by the polyphase filter.
pub const NUM_SUBBANDS: usize = 512;

/// The number of channels a subband is split into.
pub const CHANNELS_PER_SUBBAND: usize = 64;

/// Magic value leading every correlator frame header.
pub const INPUT_MAGIC: u32 = 0x3B98_F002;

/// Magic value leading every calibrated output frame header.
pub const OUTPUT_MAGIC: u64 = 0x4141_5254_4641_4143;

/// The size of both input and output headers \[bytes\].
pub const HEADER_SIZE: usize = 512;

/// Frames with this fraction (or more) of their antennas flagged are not
/// calibrated.
pub const MAX_FLAGGED_FRACTION: f64 = 0.2;

/// Antennas with a mean absolute visibility at or below this are dead.
pub const DEAD_ANTENNA_THRESHOLD: f32 = 1e-5;

/// The maximum number of WALS major cycles.
pub const MAX_MAJOR_CYCLES: usize = 10;

/// The maximum number of gain-solve minor cycles.
pub const MAX_MINOR_CYCLES: usize = 30;

/// WALS stops once the relative parameter change is below this.
pub const MAJOR_CYCLE_TOLERANCE: f64 = 1e-3;

/// The gain solve stops once the relative gain change is at or below this.
pub const MINOR_CYCLE_TOLERANCE: f64 = 1e-6;

/// The maximum number of sigma-clipping iterations.
pub const MAX_SIGMA_CLIP_ITERATIONS: usize = 100;

/// Baselines shorter than this many wavelengths are not used for calibration.
pub const MIN_BASELINE_WAVELENGTHS: f64 = 10.0;

/// ... unless this is shorter \[metres\].
pub const MAX_BASELINE_CUTOFF_M: f64 = 350.0;

/// Bright sources must project onto the station normal by more than this to be
/// used.
pub const HORIZON_LIMIT: f64 = 0.1;

/// Sources fainter than this fraction of the first source are not refined.
pub const MIN_RELATIVE_FLUX: f32 = 0.01;

/// Nelder-Mead tolerance used when refining source directions.
pub const SIMPLEX_TOLERANCE: f64 = 1e-3;

/// Nelder-Mead iteration cap used when refining source directions.
pub const SIMPLEX_MAX_ITERATIONS: usize = 1000;

/// Default antenna sigma-clipping threshold.
pub const DEFAULT_ANT_SIGMA: f32 = 4.0;

/// Default visibility (channel) sigma-clipping threshold.
pub const DEFAULT_VIS_SIGMA: f32 = 3.0;

/// Default number of buffered frames per polarisation.
pub const DEFAULT_BUFFER_DEPTH: usize = 20;

/// Default number of pipeline worker threads.
pub const DEFAULT_NUM_THREADS: usize = 2;

/// Default TCP port to listen on.
pub const DEFAULT_PORT: u16 = 4000;
