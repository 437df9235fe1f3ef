// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Real-time flagging and self-calibration of array correlation matrices
//! streamed from a radio-telescope correlator.
//!
//! Raw correlator frames are read by [`stream::StreamReader`], split into one
//! [`frame::FrameBuffer`] per polarisation and handed to a [`Pipeline`], whose
//! workers run the [`Stage`]s (weighting, flagging, self-calibration) over
//! each [`Frame`] before writing it to the output sinks.

pub mod antenna;
mod cli;
pub mod constants;
pub mod coord;
pub mod frame;
pub mod math;
pub mod pipeline;
pub mod server;
pub mod stages;
pub mod stream;

// Re-exports.
pub use antenna::AntennaPositions;
pub use cli::{Rtcal, RtcalError};
pub use frame::{ArrayLayout, Frame, FrameBuffer, OutputHeader};
pub use pipeline::{BufferPool, Pipeline};
pub use stages::{calibrate::Calibrator, flag::Flagger, weight::Weighter, Stage};

/// Single-precision complex numbers. Visibilities, gains and the array
/// correlation matrix use these.
#[allow(non_camel_case_types)]
pub type c32 = num_complex::Complex32;

/// Double-precision complex numbers. Most calibration arithmetic uses these.
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex64;
