// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Frequency, time and sky-coordinate helpers.
//!
//! Everything here is a pure function of its arguments. Directions are unit
//! vectors in an Earth-fixed (ITRF) frame; x points at the Greenwich meridian
//! on the equator and z at the celestial pole. Sidereal time and precession
//! come from marlu.

#[cfg(test)]
mod tests;

use hifitime::Epoch;

use crate::constants::{CHANNELS_PER_SUBBAND, SAMPLE_CLOCK_HZ, TAU};

/// Julian date of the J2000.0 epoch.
pub const J2000_JD: f64 = 2_451_545.0;

/// Offset between Julian and modified Julian dates \[days\].
pub const MJD_OFFSET: f64 = 2_400_000.5;

/// The width of a single subband \[Hz\].
pub fn subband_width() -> f64 {
    SAMPLE_CLOCK_HZ / 1024.0
}

/// The central frequency of a subband \[Hz\].
pub fn subband_to_frequency(subband: usize) -> f64 {
    subband_width() * subband as f64
}

/// The frequency of a channel within a subband \[Hz\]. Channel 0 sits on the
/// lower edge of the subband.
pub fn channel_to_frequency(subband: usize, channel: usize) -> f64 {
    let width = subband_width();
    let channel_width = width / CHANNELS_PER_SUBBAND as f64;
    (subband_to_frequency(subband) - width / 2.0) + channel as f64 * channel_width
}

/// The mean frequency of an inclusive channel range \[Hz\].
pub fn range_to_frequency(subband: usize, start: usize, end: usize) -> f64 {
    (channel_to_frequency(subband, start) + channel_to_frequency(subband, end)) * 0.5
}

/// Convert a unix timestamp \[seconds\] into an [`Epoch`].
pub fn unix_to_epoch(unix_seconds: f64) -> Epoch {
    Epoch::from_unix_seconds(unix_seconds)
}

/// Convert a unix timestamp \[seconds\] into a modified Julian date (UTC).
pub fn unix_to_mjd(unix_seconds: f64) -> f64 {
    unix_to_epoch(unix_seconds).to_mjd_utc_days()
}

/// Convert a unix timestamp \[seconds\] into a Julian date (UTC).
pub fn unix_to_jd(unix_seconds: f64) -> f64 {
    unix_to_mjd(unix_seconds) + MJD_OFFSET
}

/// The apparent (RA, Dec) of the Sun \[radians\] at a Julian date, of date.
/// This is the low-precision Astronomical Almanac formula, good to ~0.01°.
pub fn sun_radec(jd: f64) -> (f64, f64) {
    let n = jd - J2000_JD;
    let mean_longitude = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
    let mean_anomaly = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();
    let ecliptic_longitude = (mean_longitude
        + 1.915 * mean_anomaly.sin()
        + 0.020 * (2.0 * mean_anomaly).sin())
    .to_radians();
    let obliquity = (23.439 - 0.000_000_4 * n).to_radians();

    let (s_l, c_l) = ecliptic_longitude.sin_cos();
    let ra = (obliquity.cos() * s_l).atan2(c_l).rem_euclid(TAU);
    let dec = (obliquity.sin() * s_l).asin();
    (ra, dec)
}

/// The geodetic longitude and latitude \[radians\] whose local vertical is
/// `normal` (an Earth-fixed unit vector).
pub fn normal_to_longitude_latitude(normal: &[f64; 3]) -> (f64, f64) {
    let (lon, lat) = cartesian_to_radec(*normal);
    // Keep longitudes west of Greenwich negative.
    let lon = if lon > TAU / 2.0 { lon - TAU } else { lon };
    (lon, lat)
}

/// The Earth-fixed unit vector for an azimuth and elevation \[radians\] seen
/// from a site at `longitude` and `latitude` \[radians\]. Azimuth is measured
/// from north through east.
pub fn azel_to_itrf(az: f64, el: f64, longitude: f64, latitude: f64) -> [f64; 3] {
    let (s_az, c_az) = az.sin_cos();
    let (s_el, c_el) = el.sin_cos();
    let (east, north, up) = (c_el * s_az, c_el * c_az, s_el);

    let (s_lon, c_lon) = longitude.sin_cos();
    let (s_lat, c_lat) = latitude.sin_cos();
    [
        -s_lon * east - s_lat * c_lon * north + c_lat * c_lon * up,
        c_lon * east - s_lat * s_lon * north + c_lat * s_lon * up,
        c_lat * north + s_lat * up,
    ]
}

/// Unit vector for a longitude/latitude pair \[radians\].
pub fn radec_to_cartesian(lon: f64, lat: f64) -> [f64; 3] {
    let (s_lon, c_lon) = lon.sin_cos();
    let (s_lat, c_lat) = lat.sin_cos();
    [c_lat * c_lon, c_lat * s_lon, s_lat]
}

/// Longitude/latitude \[radians\] of a (not necessarily unit) vector. The
/// longitude is in [0, 2π).
pub fn cartesian_to_radec(v: [f64; 3]) -> (f64, f64) {
    let lon = v[1].atan2(v[0]).rem_euclid(TAU);
    let lat = v[2].atan2(v[0].hypot(v[1]));
    (lon, lat)
}
