// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The 512-byte headers leading correlator frames and output frames.
//!
//! Both are little endian. The layouts are:
//!
//! Input (from the correlator):
//!
//! | offset | size | field                               |
//! |--------|------|-------------------------------------|
//! | 0      | 4    | magic (u32)                         |
//! | 4      | 4    | padding                             |
//! | 8      | 8    | start time (f64, unix seconds)      |
//! | 16     | 8    | end time (f64, unix seconds)        |
//! | 24     | 348  | station-pair weights (87 × u32)     |
//! | 372    | 140  | padding                             |
//!
//! Output:
//!
//! | offset | size | field                               |
//! |--------|------|-------------------------------------|
//! | 0      | 8    | magic (u64)                         |
//! | 8      | 8    | start time (f64, unix seconds)      |
//! | 16     | 8    | end time (f64, unix seconds)        |
//! | 24     | 4    | subband (i32)                       |
//! | 28     | 4    | number of dipoles (i32)             |
//! | 32     | 4    | polarisation (i32, XX=0, YY=1)      |
//! | 36     | 4    | number of channels (i32)            |
//! | 40     | 20   | bright-source fluxes (5 × f32)      |
//! | 60     | 4    | active bright sources (u32, 5 bits) |
//! | 64     | 8    | flagged channels (u64 bitset)       |
//! | 72     | 72   | flagged dipoles (9 × u64 bitset)    |
//! | 144    | 312  | station-pair weights (78 × u32)     |
//! | 456    | 56   | padding                             |

use byteorder::{ByteOrder, LittleEndian};
use static_assertions::const_assert;

use super::HeaderError;
use crate::constants::{HEADER_SIZE, INPUT_MAGIC, OUTPUT_MAGIC};

/// The number of station-pair weights in an input header.
pub const NUM_INPUT_WEIGHTS: usize = 87;

/// The number of station-pair weights carried in an output header.
pub const NUM_OUTPUT_WEIGHTS: usize = 78;

/// The number of catalogued bright sources.
pub const NUM_BRIGHT_SOURCES: usize = 5;

/// The number of 64-bit words in the flagged-dipole bitset.
pub const NUM_DIPOLE_WORDS: usize = 9;

/// The maximum number of dipoles an output header can describe.
pub const MAX_DIPOLES: usize = NUM_DIPOLE_WORDS * 64;

/// The maximum number of channels an output header can describe.
pub const MAX_CHANNELS: usize = 64;

const IN_WEIGHTS_OFFSET: usize = 24;
const IN_END: usize = IN_WEIGHTS_OFFSET + NUM_INPUT_WEIGHTS * 4;

const OUT_FLUXES_OFFSET: usize = 40;
const OUT_ACTIVE_OFFSET: usize = OUT_FLUXES_OFFSET + NUM_BRIGHT_SOURCES * 4;
const OUT_CHANNELS_OFFSET: usize = OUT_ACTIVE_OFFSET + 4;
const OUT_DIPOLES_OFFSET: usize = OUT_CHANNELS_OFFSET + 8;
const OUT_WEIGHTS_OFFSET: usize = OUT_DIPOLES_OFFSET + NUM_DIPOLE_WORDS * 8;
const OUT_END: usize = OUT_WEIGHTS_OFFSET + NUM_OUTPUT_WEIGHTS * 4;

const_assert!(IN_END <= HEADER_SIZE);
const_assert!(OUT_END <= HEADER_SIZE);
const_assert!(NUM_OUTPUT_WEIGHTS <= NUM_INPUT_WEIGHTS);

/// The header of a frame coming from the correlator.
#[derive(Debug, Clone, PartialEq)]
pub struct InputHeader {
    pub magic: u32,

    /// \[unix seconds\]
    pub start_time: f64,

    /// \[unix seconds\]
    pub end_time: f64,

    /// Per-station-pair reliability weights. All zero if the correlator
    /// doesn't provide them.
    pub weights: [u32; NUM_INPUT_WEIGHTS],
}

impl Default for InputHeader {
    fn default() -> Self {
        InputHeader {
            magic: INPUT_MAGIC,
            start_time: 0.0,
            end_time: 0.0,
            weights: [0; NUM_INPUT_WEIGHTS],
        }
    }
}

impl InputHeader {
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> InputHeader {
        let mut weights = [0; NUM_INPUT_WEIGHTS];
        LittleEndian::read_u32_into(&bytes[IN_WEIGHTS_OFFSET..IN_END], &mut weights);
        InputHeader {
            magic: LittleEndian::read_u32(&bytes[0..4]),
            start_time: LittleEndian::read_f64(&bytes[8..16]),
            end_time: LittleEndian::read_f64(&bytes[16..24]),
            weights,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0; HEADER_SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], self.magic);
        LittleEndian::write_f64(&mut bytes[8..16], self.start_time);
        LittleEndian::write_f64(&mut bytes[16..24], self.end_time);
        LittleEndian::write_u32_into(&self.weights, &mut bytes[IN_WEIGHTS_OFFSET..IN_END]);
        bytes
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == INPUT_MAGIC
    }
}

/// The header of an output frame. It is built from an [`InputHeader`] and
/// filled in by the processing stages.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputHeader {
    pub magic: u64,

    /// \[unix seconds\]
    pub start_time: f64,

    /// \[unix seconds\]
    pub end_time: f64,

    pub subband: i32,

    pub num_dipoles: i32,

    /// XX = 0, YY = 1.
    pub polarisation: i32,

    /// The number of channels in the subband, including the undelivered
    /// channel 0.
    pub num_channels: i32,

    /// Estimated flux of each catalogued bright source. Only meaningful for
    /// active sources.
    pub source_fluxes: [f32; NUM_BRIGHT_SOURCES],

    /// Bit `i` is set when catalogued source `i` was used for calibration.
    pub active_sources: u32,

    /// Bit `c` is set when subband channel `c` is flagged.
    pub flagged_channels: u64,

    /// Bit `a` is set when dipole (antenna) `a` is flagged.
    pub flagged_dipoles: [u64; NUM_DIPOLE_WORDS],

    pub weights: [u32; NUM_OUTPUT_WEIGHTS],
}

impl Default for OutputHeader {
    fn default() -> Self {
        OutputHeader {
            magic: OUTPUT_MAGIC,
            start_time: 0.0,
            end_time: 0.0,
            subband: 0,
            num_dipoles: 0,
            polarisation: 0,
            num_channels: 0,
            source_fluxes: [0.0; NUM_BRIGHT_SOURCES],
            active_sources: 0,
            flagged_channels: 0,
            flagged_dipoles: [0; NUM_DIPOLE_WORDS],
            weights: [0; NUM_OUTPUT_WEIGHTS],
        }
    }
}

impl OutputHeader {
    /// Build a fresh output header for one polarisation of a correlator frame.
    /// Nothing but channel 0 (which the correlator never delivers) is flagged.
    pub fn from_input(
        input: &InputHeader,
        subband: i32,
        num_dipoles: usize,
        num_channels: usize,
        polarisation: i32,
    ) -> OutputHeader {
        let mut weights = [0; NUM_OUTPUT_WEIGHTS];
        weights.copy_from_slice(&input.weights[..NUM_OUTPUT_WEIGHTS]);
        OutputHeader {
            magic: OUTPUT_MAGIC,
            start_time: input.start_time,
            end_time: input.end_time,
            subband,
            num_dipoles: num_dipoles as i32,
            polarisation,
            num_channels: num_channels as i32 + 1,
            flagged_channels: 1,
            weights,
            ..Default::default()
        }
    }

    pub fn encode_into(&self, bytes: &mut [u8; HEADER_SIZE]) {
        bytes.fill(0);
        LittleEndian::write_u64(&mut bytes[0..8], self.magic);
        LittleEndian::write_f64(&mut bytes[8..16], self.start_time);
        LittleEndian::write_f64(&mut bytes[16..24], self.end_time);
        LittleEndian::write_i32(&mut bytes[24..28], self.subband);
        LittleEndian::write_i32(&mut bytes[28..32], self.num_dipoles);
        LittleEndian::write_i32(&mut bytes[32..36], self.polarisation);
        LittleEndian::write_i32(&mut bytes[36..40], self.num_channels);
        LittleEndian::write_f32_into(
            &self.source_fluxes,
            &mut bytes[OUT_FLUXES_OFFSET..OUT_ACTIVE_OFFSET],
        );
        LittleEndian::write_u32(
            &mut bytes[OUT_ACTIVE_OFFSET..OUT_CHANNELS_OFFSET],
            self.active_sources,
        );
        LittleEndian::write_u64(
            &mut bytes[OUT_CHANNELS_OFFSET..OUT_DIPOLES_OFFSET],
            self.flagged_channels,
        );
        LittleEndian::write_u64_into(
            &self.flagged_dipoles,
            &mut bytes[OUT_DIPOLES_OFFSET..OUT_WEIGHTS_OFFSET],
        );
        LittleEndian::write_u32_into(&self.weights, &mut bytes[OUT_WEIGHTS_OFFSET..OUT_END]);
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0; HEADER_SIZE];
        self.encode_into(&mut bytes);
        bytes
    }

    /// Decode an output header from the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<OutputHeader, HeaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(HeaderError::TooShort { got: bytes.len() });
        }
        let magic = LittleEndian::read_u64(&bytes[0..8]);
        if magic != OUTPUT_MAGIC {
            return Err(HeaderError::InvalidMagic {
                expected: OUTPUT_MAGIC,
                got: magic,
            });
        }

        let mut source_fluxes = [0.0; NUM_BRIGHT_SOURCES];
        LittleEndian::read_f32_into(
            &bytes[OUT_FLUXES_OFFSET..OUT_ACTIVE_OFFSET],
            &mut source_fluxes,
        );
        let mut flagged_dipoles = [0; NUM_DIPOLE_WORDS];
        LittleEndian::read_u64_into(
            &bytes[OUT_DIPOLES_OFFSET..OUT_WEIGHTS_OFFSET],
            &mut flagged_dipoles,
        );
        let mut weights = [0; NUM_OUTPUT_WEIGHTS];
        LittleEndian::read_u32_into(&bytes[OUT_WEIGHTS_OFFSET..OUT_END], &mut weights);

        Ok(OutputHeader {
            magic,
            start_time: LittleEndian::read_f64(&bytes[8..16]),
            end_time: LittleEndian::read_f64(&bytes[16..24]),
            subband: LittleEndian::read_i32(&bytes[24..28]),
            num_dipoles: LittleEndian::read_i32(&bytes[28..32]),
            polarisation: LittleEndian::read_i32(&bytes[32..36]),
            num_channels: LittleEndian::read_i32(&bytes[36..40]),
            source_fluxes,
            active_sources: LittleEndian::read_u32(&bytes[OUT_ACTIVE_OFFSET..OUT_CHANNELS_OFFSET]),
            flagged_channels: LittleEndian::read_u64(
                &bytes[OUT_CHANNELS_OFFSET..OUT_DIPOLES_OFFSET],
            ),
            flagged_dipoles,
            weights,
        })
    }

    /// The centre of the integration \[unix seconds\].
    pub fn central_time(&self) -> f64 {
        0.5 * (self.start_time + self.end_time)
    }

    pub fn is_dipole_flagged(&self, dipole: usize) -> bool {
        self.flagged_dipoles[dipole / 64] & (1 << (dipole % 64)) != 0
    }

    pub fn flag_dipole(&mut self, dipole: usize) {
        self.flagged_dipoles[dipole / 64] |= 1 << (dipole % 64);
    }

    pub fn num_flagged_dipoles(&self) -> usize {
        self.flagged_dipoles
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum()
    }

    pub fn is_channel_flagged(&self, channel: usize) -> bool {
        self.flagged_channels & (1 << channel) != 0
    }

    pub fn flag_channel(&mut self, channel: usize) {
        self.flagged_channels |= 1 << channel;
    }

    pub fn num_flagged_channels(&self) -> usize {
        self.flagged_channels.count_ones() as usize
    }

    pub fn is_source_active(&self, source: usize) -> bool {
        self.active_sources & (1 << source) != 0
    }

    pub fn set_source_active(&mut self, source: usize, active: bool) {
        if active {
            self.active_sources |= 1 << source;
        } else {
            self.active_sources &= !(1 << source);
        }
    }

    pub fn polarisation_name(&self) -> &'static str {
        if self.polarisation == 0 {
            "XX"
        } else {
            "YY"
        }
    }
}
