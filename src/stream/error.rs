// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with reading correlator streams.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid input magic {got:#010x}; expected {expected:#010x}. The correlator stream is corrupt or not a correlator stream")]
    InvalidMagic { expected: u32, got: u32 },

    #[error("Connection closed part way through a frame header ({got} of {expected} bytes)")]
    TruncatedHeader { got: usize, expected: usize },

    #[error("The processing pipeline has shut down")]
    PipelineClosed,

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl StreamError {
    /// Fatal errors mean the stream can't be trusted at all; anything else
    /// only ends the current connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamError::InvalidMagic { .. })
    }
}
