// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with output sinks.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Output '{0}' is not understood; expected 'file:<path>' or 'tcp:<host>:<port>'")]
    InvalidSpec(String),

    #[error("Output '{0}' has an empty destination")]
    EmptyDestination(String),

    #[error("Couldn't open output {name}: {err}")]
    Open {
        name: String,
        #[source]
        err: std::io::Error,
    },

    #[error("Couldn't write to output {name}: {err}")]
    Write {
        name: String,
        #[source]
        err: std::io::Error,
    },
}
