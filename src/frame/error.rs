// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with frame headers and array layouts.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Header is only {got} bytes long; expected 512")]
    TooShort { got: usize },

    #[error("Invalid header magic {got:#x}; expected {expected:#x}")]
    InvalidMagic { expected: u64, got: u64 },

    #[error("{num_antennas} antennas don't fit in a header (at most {max})")]
    TooManyAntennas { num_antennas: usize, max: usize },

    #[error("{num_channels} channels don't fit in a header (at most {max}, including channel 0)")]
    TooManyChannels { num_channels: usize, max: usize },

    #[error("{num_pairs} station pairs don't fit in a header (at most {max})")]
    TooManyStationPairs { num_pairs: usize, max: usize },

    #[error("The array layout is empty ({num_stations} stations, {antennas_per_station} antennas per station, {num_channels} channels)")]
    EmptyLayout {
        num_stations: usize,
        antennas_per_station: usize,
        num_channels: usize,
    },
}
