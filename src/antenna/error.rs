// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with reading antenna positions.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AntennaPositionsError {
    #[error("Antenna positions file {0} does not exist")]
    DoesNotExist(PathBuf),

    #[error("{file}:{line}: expected three whitespace-separated coordinates (x y z), got '{text}'")]
    BadLine {
        file: String,
        line: usize,
        text: String,
    },

    #[error("{file}:{line}: couldn't parse '{text}' as a coordinate")]
    ParseFloat {
        file: String,
        line: usize,
        text: String,
    },

    #[error("{file} contains {got} antenna positions, but {expected} were expected")]
    WrongCount {
        file: String,
        got: usize,
        expected: usize,
    },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
