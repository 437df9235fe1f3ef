// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The processing applied to every frame.
//!
//! Stages never fail and never do I/O; anything that goes wrong inside a stage
//! is logged and leaves the frame in a usable state for the stages after it.

pub mod calibrate;
pub mod flag;
pub mod weight;

use crate::frame::Frame;

use calibrate::Calibrator;
use flag::Flagger;
use weight::Weighter;

#[derive(Debug, Clone)]
pub enum Stage {
    Weight(Weighter),
    Flag(Flagger),
    Calibrate(Calibrator),
}

impl Stage {
    pub fn run(&self, frame: &mut Frame) {
        match self {
            Stage::Weight(s) => s.run(frame),
            Stage::Flag(s) => s.run(frame),
            Stage::Calibrate(s) => s.run(frame),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Weight(_) => "weight",
            Stage::Flag(_) => "flag",
            Stage::Calibrate(_) => "calibrate",
        }
    }
}
