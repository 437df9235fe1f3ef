// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The bright sources used as calibrators.

use hifitime::{Duration, Epoch};
use marlu::{
    precession::{get_lmst, precess_time},
    RADec,
};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::{
    antenna::STATION_NORMAL,
    constants::HORIZON_LIMIT,
    coord::{azel_to_itrf, normal_to_longitude_latitude, sun_radec},
};

/// The catalogue, in header order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum BrightSource {
    #[strum(serialize = "Cas A")]
    CasA,

    #[strum(serialize = "Cyg A")]
    CygA,

    #[strum(serialize = "Tau A")]
    TauA,

    #[strum(serialize = "Vir A")]
    VirA,

    Sun,
}

impl BrightSource {
    /// The index of this source in header fields.
    pub fn index(self) -> usize {
        self as usize
    }

    /// J2000 (RA, Dec) \[degrees\]. The Sun moves, so it has none.
    pub fn j2000_radec(self) -> Option<(f64, f64)> {
        match self {
            BrightSource::CasA => Some((350.85, 58.815)),
            BrightSource::CygA => Some((299.868_153, 40.733_917)),
            BrightSource::TauA => Some((83.633_083, 22.014_5)),
            BrightSource::VirA => Some((187.705_917, 12.391_111)),
            BrightSource::Sun => None,
        }
    }

    /// The apparent direction of the source at `epoch`, as an Earth-fixed
    /// unit vector.
    ///
    /// Catalogue positions are J2000, so the array is precessed to J2000
    /// before the source's azimuth and elevation are found. The Sun's position
    /// is already of date.
    pub fn itrf_direction(self, epoch: Epoch) -> [f64; 3] {
        let (longitude, latitude) = normal_to_longitude_latitude(&STATION_NORMAL);
        let dut1 = Duration::from_seconds(0.0);
        let azel = match self.j2000_radec() {
            Some((ra, dec)) => {
                let precession_info = precess_time(
                    longitude,
                    latitude,
                    RADec::from_degrees(ra, dec),
                    epoch,
                    dut1,
                );
                precession_info
                    .hadec_j2000
                    .to_azel(precession_info.array_latitude_j2000)
            }
            None => {
                let (ra, dec) = sun_radec(epoch.to_jde_utc_days());
                let lst = get_lmst(longitude, epoch, dut1);
                RADec::from_degrees(ra.to_degrees(), dec.to_degrees())
                    .to_hadec(lst)
                    .to_azel(latitude)
            }
        };
        azel_to_itrf(azel.az, azel.el, longitude, latitude)
    }
}

/// The projection of a direction onto the station normal. 1 is straight up,
/// 0 is on the horizon.
pub fn elevation_projection(direction: &[f64; 3]) -> f64 {
    direction
        .iter()
        .zip(STATION_NORMAL.iter())
        .map(|(d, n)| d * n)
        .sum()
}

/// Catalogue sources that are far enough above the horizon at `epoch` to
/// calibrate with, and their directions.
pub fn visible_sources(epoch: Epoch) -> Vec<(BrightSource, [f64; 3])> {
    BrightSource::iter()
        .map(|s| (s, s.itrf_direction(epoch)))
        .filter(|(_, dir)| elevation_projection(dir) > HORIZON_LIMIT)
        .collect()
}
