// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;
use crate::constants::FRAC_PI_2;

#[test]
fn test_subband_frequencies() {
    assert_abs_diff_eq!(subband_width(), 195312.5);
    assert_abs_diff_eq!(subband_to_frequency(256), 50e6);
    assert_abs_diff_eq!(channel_to_frequency(256, 0), 50e6 - 97656.25);
    // The middle channel is the subband centre.
    assert_abs_diff_eq!(channel_to_frequency(256, 32), 50e6);
    assert_abs_diff_eq!(range_to_frequency(256, 0, 64), 50e6);
    assert_abs_diff_eq!(
        range_to_frequency(256, 10, 20),
        channel_to_frequency(256, 15),
        epsilon = 1e-6
    );
}

#[test]
fn test_unix_to_mjd() {
    // The unix epoch.
    assert_abs_diff_eq!(unix_to_mjd(0.0), 40587.0, epsilon = 1e-9);
    assert_abs_diff_eq!(unix_to_jd(0.0), 2440587.5, epsilon = 1e-9);
    // 2000-01-01T12:00:00 UTC
    assert_abs_diff_eq!(unix_to_jd(946_728_000.0), J2000_JD, epsilon = 1e-6);
}

#[test]
fn test_sun_radec() {
    // J2000.0: the Sun is near the winter solstice.
    let (ra, dec) = sun_radec(J2000_JD);
    assert_abs_diff_eq!(ra.to_degrees(), 281.28, epsilon = 0.05);
    assert_abs_diff_eq!(dec.to_degrees(), -23.03, epsilon = 0.05);

    // The March equinox of 2000 (March 20, 07:35 UT).
    let (ra, dec) = sun_radec(2451623.816);
    assert!(ra.to_degrees() < 0.1 || ra.to_degrees() > 359.9);
    assert_abs_diff_eq!(dec.to_degrees(), 0.0, epsilon = 0.05);
}

#[test]
fn test_radec_cartesian_round_trip() {
    let (lon, lat) = (1.2345, -0.5432);
    let v = radec_to_cartesian(lon, lat);
    assert_abs_diff_eq!(v[0] * v[0] + v[1] * v[1] + v[2] * v[2], 1.0, epsilon = 1e-15);
    let (lon2, lat2) = cartesian_to_radec(v);
    assert_abs_diff_eq!(lon2, lon, epsilon = 1e-12);
    assert_abs_diff_eq!(lat2, lat, epsilon = 1e-12);
}

#[test]
fn test_unix_to_epoch() {
    let epoch = unix_to_epoch(946_728_000.0);
    assert_abs_diff_eq!(epoch.to_jde_utc_days(), J2000_JD, epsilon = 1e-6);
}

#[test]
fn test_normal_to_longitude_latitude() {
    let (lon, lat) = normal_to_longitude_latitude(&[0.0, 0.0, 1.0]);
    assert_abs_diff_eq!(lat, FRAC_PI_2, epsilon = 1e-12);
    assert_abs_diff_eq!(lon, 0.0, epsilon = 1e-12);

    // West of Greenwich.
    let normal = radec_to_cartesian(-0.5, 0.9);
    let (lon, lat) = normal_to_longitude_latitude(&normal);
    assert_abs_diff_eq!(lon, -0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(lat, 0.9, epsilon = 1e-12);
}

#[test]
fn test_azel_to_itrf() {
    let (lon, lat) = (0.12, 0.92);

    // Straight up is the site's normal.
    let up = azel_to_itrf(0.3, FRAC_PI_2, lon, lat);
    let normal = radec_to_cartesian(lon, lat);
    for c in 0..3 {
        assert_abs_diff_eq!(up[c], normal[c], epsilon = 1e-12);
    }

    // North on the horizon, seen from the northern hemisphere, tilts towards
    // the celestial pole.
    let north = azel_to_itrf(0.0, 0.0, lon, lat);
    assert_abs_diff_eq!(north[2], lat.cos(), epsilon = 1e-12);

    // East on the horizon is in the equatorial plane.
    let east = azel_to_itrf(FRAC_PI_2, 0.0, lon, lat);
    assert_abs_diff_eq!(east[2], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(east[0], -lon.sin(), epsilon = 1e-12);
    assert_abs_diff_eq!(east[1], lon.cos(), epsilon = 1e-12);

    // Always a unit vector, and the elevation is preserved.
    let v = azel_to_itrf(2.1, 0.4, lon, lat);
    let norm = v.iter().map(|x| x * x).sum::<f64>();
    assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-12);
    let dot: f64 = v.iter().zip(normal.iter()).map(|(a, b)| a * b).sum();
    assert_abs_diff_eq!(dot, 0.4_f64.sin(), epsilon = 1e-12);
}
