// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Weighting, flagging and calibrating a synthetic frame.

use std::sync::Arc;

use rtcal::{stages::flag::ChannelRange, Calibrator, Flagger, Stage, Weighter};

use super::*;

fn stages(positions: AntennaPositions) -> Vec<Stage> {
    let layout = layout();
    let channels = [ChannelRange {
        start: 0,
        end: layout.num_channels - 1,
    }];
    vec![
        Stage::Weight(Weighter),
        Stage::Flag(Flagger::new(4.0, 3.0, &channels, &layout)),
        Stage::Calibrate(Calibrator::new(Arc::new(positions))),
    ]
}

#[test]
fn test_calibrate_synthetic_frame() {
    let (mut frame, true_gains) = synthetic_frame();
    for stage in stages(positions(&layout())) {
        stage.run(&mut frame);
    }

    assert!(frame.is_valid());
    let report = frame.calibration.as_ref().expect("the frame was calibrated");
    assert!(report.converged, "{report:?}");

    // Gains are only known up to a common phase.
    let unflagged: Vec<usize> = (0..frame.num_antennas())
        .filter(|&a| !frame.is_flagged(a))
        .collect();
    let reference = unflagged[0];
    for &a in &unflagged {
        let expected = (true_gains[a] * true_gains[reference].conj()).arg();
        let got = report.gains[a] * report.gains[reference].conj();
        let diff = (got.arg() as f64 - expected + std::f64::consts::PI)
            .rem_euclid(std::f64::consts::TAU)
            - std::f64::consts::PI;
        assert!(diff.abs() < 1e-3, "antenna {a}: phase error {diff}");

        // Whitening divides out almost all of the 5% amplitude errors, and
        // the gains are normalised to a unit mean amplitude.
        let amp = report.gains[a].norm();
        assert!((amp - 1.0).abs() < 0.02, "antenna {a}: amplitude {amp}");
    }
    for &a in &frame.flagged {
        assert_eq!(report.gains[a], c32::default());
    }

    // Every visible source was bright enough to be kept.
    let visible = visible_sources(unix_to_epoch(UNIX_TIME));
    let fluxes = true_fluxes(visible.len());
    assert_eq!(report.fluxes.len(), visible.len());
    for (k, (source, _)) in visible.iter().enumerate() {
        assert!(frame.header.is_source_active(source.index()));
        // The data are whitened, so only flux ratios survive.
        let ratio = frame.header.source_fluxes[source.index()]
            / frame.header.source_fluxes[visible[0].0.index()];
        assert!(
            (f64::from(ratio) - fluxes[k] / fluxes[0]).abs() < 0.05,
            "{source}: flux ratio {ratio}"
        );
    }

    assert!(frame.acm.iter().all(|v| v.is_finite()));
}

#[test]
fn test_too_many_flagged_antennas() {
    let (mut frame, _) = synthetic_frame();
    // Silence a third of the array.
    let layout = layout();
    let mut vis = frame.vis_view_mut();
    for a1 in 0..16 {
        for a2 in 0..layout.num_antennas() {
            vis.row_mut(ArrayLayout::baseline_index(a1, a2))
                .fill(c32::default());
        }
    }
    for stage in stages(positions(&layout)) {
        stage.run(&mut frame);
    }

    assert!(frame.flagged.len() >= 16);
    assert!(!frame.is_valid());
    assert!(frame.calibration.is_none());
    assert_eq!(frame.header.active_sources, 0);
}
