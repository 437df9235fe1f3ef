// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all rtcal-related errors. This should be the *only* error
//! enum that is publicly visible.

use thiserror::Error;

use super::serve::ServeArgsError;
use crate::{
    antenna::AntennaPositionsError, frame::HeaderError, pipeline::SinkError, stream::StreamError,
};

/// The *only* publicly visible error from rtcal. Each variant is a category
/// with a hint on where to look next, unless it's "generic".
#[derive(Error, Debug)]
pub enum RtcalError {
    /// A command-line argument is missing or out of range.
    #[error("{0}\n\nSee 'rtcal serve --help' for the valid values.")]
    Args(String),

    /// An error related to argument files.
    #[error("{0}\n\nArgument files hold the same arguments as the command line, in toml or json.")]
    ArgFile(String),

    /// The array dimensions don't fit the frame format.
    #[error("{0}\n\nThe array layout is set by --stations, --antennas-per-station and --num-channels.")]
    Layout(String),

    /// An error related to the antenna positions file.
    #[error("{0}\n\nThe antenna positions file should have one 'x y z' ITRF position [metres] per line, in antenna order.")]
    AntennaPositions(String),

    /// An error related to an output sink.
    #[error("{0}\n\nOutputs are given as 'file:<path>' or 'tcp:<host>:<port>'.")]
    Output(String),

    /// A correlator stream couldn't be read.
    #[error("{0}")]
    Stream(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<ServeArgsError> for RtcalError {
    fn from(e: ServeArgsError) -> Self {
        match e {
            ServeArgsError::AntennaPositions(e) => Self::from(e),
            ServeArgsError::Layout(e) => Self::from(e),
            ServeArgsError::Output(e) => Self::from(e),
            ServeArgsError::AntSigma(_)
            | ServeArgsError::VisSigma(_)
            | ServeArgsError::Subband(_)
            | ServeArgsError::NumThreads
            | ServeArgsError::BufferDepth
            | ServeArgsError::Port(_)
            | ServeArgsError::NoAntennaFile
            | ServeArgsError::NoOutputs
            | ServeArgsError::ChannelSyntax(_)
            | ServeArgsError::ChannelRangeBackwards(_)
            | ServeArgsError::ChannelsOverlap { .. }
            | ServeArgsError::ChannelOutOfRange { .. } => Self::Args(e.to_string()),
        }
    }
}

impl From<AntennaPositionsError> for RtcalError {
    fn from(e: AntennaPositionsError) -> Self {
        Self::AntennaPositions(e.to_string())
    }
}

impl From<HeaderError> for RtcalError {
    fn from(e: HeaderError) -> Self {
        Self::Layout(e.to_string())
    }
}

impl From<SinkError> for RtcalError {
    fn from(e: SinkError) -> Self {
        Self::Output(e.to_string())
    }
}

impl From<StreamError> for RtcalError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e.to_string())
    }
}

// Library errors.

impl From<std::io::Error> for RtcalError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
