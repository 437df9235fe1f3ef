// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Antenna positions and the baselines between them.
//!
//! An [`AntennaPositions`] is built once at start up and is never modified
//! afterwards, so it is shared between threads behind an `Arc`.

mod error;

pub use error::AntennaPositionsError;

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use log::debug;
use ndarray::prelude::*;

/// Rotation from ITRF into the station-local frame of the central station.
/// The third column is the station normal.
pub const ITRF_TO_LOCAL: [[f64; 3]; 3] = [
    [-0.119_595, -0.791_954, 0.598_753],
    [0.992_823, -0.095_419, 0.072_099],
    [0.000_033, 0.603_078, 0.797_682],
];

/// The normal to the central station's plane, in ITRF.
pub const STATION_NORMAL: [f64; 3] = [
    ITRF_TO_LOCAL[0][2],
    ITRF_TO_LOCAL[1][2],
    ITRF_TO_LOCAL[2][2],
];

#[derive(Debug, Clone)]
pub struct AntennaPositions {
    /// ITRF positions \[metres\]. Shape `(num_antennas, 3)`.
    itrf: Array2<f64>,

    /// Positions in the station-local frame \[metres\]. Shape
    /// `(num_antennas, 3)`.
    local: Array2<f64>,

    /// `itrf[a1] - itrf[a2]` for every antenna pair. Shape
    /// `(num_antennas, num_antennas, 3)`.
    uvw: Array3<f64>,

    /// The lengths of the `uvw` vectors. Shape
    /// `(num_antennas, num_antennas)`.
    baseline_lengths: Array2<f64>,
}

impl AntennaPositions {
    /// Read a plain-text file with one "x y z" ITRF position per line.
    /// Lines starting with `#` and blank lines are ignored. Exactly
    /// `num_antennas` positions must be present.
    pub fn read<P: AsRef<Path>>(
        path: P,
        num_antennas: usize,
    ) -> Result<AntennaPositions, AntennaPositionsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AntennaPositionsError::DoesNotExist(path.to_path_buf()));
        }
        let file = BufReader::new(File::open(path)?);
        let positions = Self::parse(file, num_antennas, &path.display().to_string())?;
        debug!(
            "Parsed {} antenna positions from {}",
            positions.num_antennas(),
            path.display()
        );
        Ok(positions)
    }

    /// Parse antenna positions from anything that reads lines. `name` is only
    /// used in error messages.
    pub fn parse<R: BufRead>(
        reader: R,
        num_antennas: usize,
        name: &str,
    ) -> Result<AntennaPositions, AntennaPositionsError> {
        let mut itrf = Vec::with_capacity(num_antennas * 3);
        let mut count = 0;
        for (i_line, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(AntennaPositionsError::BadLine {
                    file: name.to_string(),
                    line: i_line + 1,
                    text: line.clone(),
                });
            }
            for field in fields {
                let v: f64 = field
                    .parse()
                    .map_err(|_| AntennaPositionsError::ParseFloat {
                        file: name.to_string(),
                        line: i_line + 1,
                        text: field.to_string(),
                    })?;
                itrf.push(v);
            }
            count += 1;
        }

        if count != num_antennas {
            return Err(AntennaPositionsError::WrongCount {
                file: name.to_string(),
                got: count,
                expected: num_antennas,
            });
        }

        let itrf = Array2::from_shape_vec((count, 3), itrf)
            .expect("three coordinates were pushed per antenna");
        Ok(Self::from_itrf(itrf))
    }

    /// Build the table from ITRF positions with shape `(num_antennas, 3)`.
    pub fn from_itrf(itrf: Array2<f64>) -> AntennaPositions {
        assert_eq!(itrf.len_of(Axis(1)), 3, "positions must have 3 coordinates");
        let n = itrf.len_of(Axis(0));

        let rot = Array2::from_shape_fn((3, 3), |(i, j)| ITRF_TO_LOCAL[i][j]);
        let local = itrf.dot(&rot);

        let mut uvw = Array3::zeros((n, n, 3));
        let mut baseline_lengths = Array2::zeros((n, n));
        for a1 in 0..n {
            for a2 in 0..n {
                let mut len_sq = 0.0;
                for c in 0..3 {
                    let d = itrf[(a1, c)] - itrf[(a2, c)];
                    uvw[(a1, a2, c)] = d;
                    len_sq += d * d;
                }
                baseline_lengths[(a1, a2)] = len_sq.sqrt();
            }
        }

        AntennaPositions {
            itrf,
            local,
            uvw,
            baseline_lengths,
        }
    }

    pub fn num_antennas(&self) -> usize {
        self.itrf.len_of(Axis(0))
    }

    /// All ITRF positions \[metres\], one row per antenna.
    pub fn itrf(&self) -> ArrayView2<f64> {
        self.itrf.view()
    }

    /// All station-local positions \[metres\], one row per antenna.
    pub fn local(&self) -> ArrayView2<f64> {
        self.local.view()
    }

    /// The baseline vector `itrf[a1] - itrf[a2]` \[metres\].
    pub fn uvw(&self, a1: usize, a2: usize) -> [f64; 3] {
        [
            self.uvw[(a1, a2, 0)],
            self.uvw[(a1, a2, 1)],
            self.uvw[(a1, a2, 2)],
        ]
    }

    /// Baseline lengths \[metres\] for every antenna pair.
    pub fn baseline_lengths(&self) -> ArrayView2<f64> {
        self.baseline_lengths.view()
    }
}
