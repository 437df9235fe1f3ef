// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use byteorder::{ByteOrder, LittleEndian};

use super::{header::*, *};
use crate::constants::{INPUT_MAGIC, OUTPUT_MAGIC};

fn small_layout() -> ArrayLayout {
    ArrayLayout {
        num_stations: 2,
        antennas_per_station: 5,
        num_channels: 4,
    }
}

#[test]
fn test_default_layout() {
    let layout = ArrayLayout::default();
    assert_eq!(layout.num_antennas(), 288);
    assert_eq!(layout.num_baselines(), 41616);
    assert_eq!(layout.num_station_pairs(), 21);
    assert_eq!(layout.input_payload_size(), 41616 * 63 * 2 * 8);
    assert!(layout.validate().is_ok());
}

#[test]
fn test_layout_validation() {
    let mut layout = small_layout();
    assert!(layout.validate().is_ok());

    layout.num_channels = 64;
    assert!(matches!(
        layout.validate(),
        Err(HeaderError::TooManyChannels { .. })
    ));

    layout.num_channels = 4;
    layout.antennas_per_station = 300;
    assert!(matches!(
        layout.validate(),
        Err(HeaderError::TooManyAntennas { .. })
    ));

    // 13 stations have 91 station pairs.
    let layout = ArrayLayout {
        num_stations: 13,
        antennas_per_station: 1,
        num_channels: 1,
    };
    assert!(matches!(
        layout.validate(),
        Err(HeaderError::TooManyStationPairs { num_pairs: 91, .. })
    ));

    let layout = ArrayLayout {
        num_stations: 0,
        antennas_per_station: 1,
        num_channels: 1,
    };
    assert!(matches!(
        layout.validate(),
        Err(HeaderError::EmptyLayout { .. })
    ));
}

#[test]
fn test_baseline_index() {
    assert_eq!(ArrayLayout::baseline_index(0, 0), 0);
    assert_eq!(ArrayLayout::baseline_index(1, 0), 1);
    assert_eq!(ArrayLayout::baseline_index(1, 1), 2);
    assert_eq!(ArrayLayout::baseline_index(2, 0), 3);
    assert_eq!(ArrayLayout::baseline_index(0, 2), 3);
    assert_eq!(ArrayLayout::baseline_index(3, 2), 8);

    // Every baseline of a 10 antenna array gets a distinct index.
    let layout = small_layout();
    let mut seen = vec![false; layout.num_baselines()];
    for a1 in 0..layout.num_antennas() {
        for a2 in 0..=a1 {
            let i = ArrayLayout::baseline_index(a1, a2);
            assert!(!seen[i]);
            seen[i] = true;
        }
    }
    assert!(seen.iter().all(|&s| s));

    assert_eq!(layout.station_of(4), 0);
    assert_eq!(layout.station_of(5), 1);
    assert_eq!(ArrayLayout::station_pair_index(1, 0), 1);
}

#[test]
fn test_input_header_decode() {
    let mut bytes = [0; HEADER_SIZE];
    LittleEndian::write_u32(&mut bytes[0..4], INPUT_MAGIC);
    LittleEndian::write_f64(&mut bytes[8..16], 1_300_000_000.0);
    LittleEndian::write_f64(&mut bytes[16..24], 1_300_000_001.0);
    LittleEndian::write_u32(&mut bytes[24..28], 7);
    LittleEndian::write_u32(&mut bytes[24 + 86 * 4..24 + 87 * 4], 99);

    let header = InputHeader::decode(&bytes);
    assert!(header.has_valid_magic());
    assert_abs_diff_eq!(header.start_time, 1_300_000_000.0);
    assert_abs_diff_eq!(header.end_time, 1_300_000_001.0);
    assert_eq!(header.weights[0], 7);
    assert_eq!(header.weights[86], 99);
    assert_eq!(header.encode(), bytes);

    LittleEndian::write_u32(&mut bytes[0..4], 0xDEAD_BEEF);
    assert!(!InputHeader::decode(&bytes).has_valid_magic());
}

#[test]
fn test_output_header_layout() {
    let mut header = OutputHeader {
        start_time: 10.0,
        end_time: 11.0,
        subband: 296,
        num_dipoles: 288,
        polarisation: 1,
        num_channels: 64,
        source_fluxes: [1.0, 2.0, 3.0, 4.0, 5.0],
        ..Default::default()
    };
    header.set_source_active(0, true);
    header.set_source_active(4, true);
    header.flag_channel(0);
    header.flag_channel(63);
    header.flag_dipole(0);
    header.flag_dipole(287);
    header.weights[77] = 12;

    let bytes = header.encode();
    assert_eq!(LittleEndian::read_u64(&bytes[0..8]), OUTPUT_MAGIC);
    assert_abs_diff_eq!(LittleEndian::read_f64(&bytes[8..16]), 10.0);
    assert_abs_diff_eq!(LittleEndian::read_f64(&bytes[16..24]), 11.0);
    assert_eq!(LittleEndian::read_i32(&bytes[24..28]), 296);
    assert_eq!(LittleEndian::read_i32(&bytes[28..32]), 288);
    assert_eq!(LittleEndian::read_i32(&bytes[32..36]), 1);
    assert_eq!(LittleEndian::read_i32(&bytes[36..40]), 64);
    assert_abs_diff_eq!(LittleEndian::read_f32(&bytes[40..44]), 1.0);
    assert_abs_diff_eq!(LittleEndian::read_f32(&bytes[56..60]), 5.0);
    assert_eq!(LittleEndian::read_u32(&bytes[60..64]), 0b10001);
    assert_eq!(LittleEndian::read_u64(&bytes[64..72]), 1 | (1 << 63));
    assert_eq!(LittleEndian::read_u64(&bytes[72..80]), 1);
    // Dipole 287 lives in word 4, bit 31.
    assert_eq!(LittleEndian::read_u64(&bytes[104..112]), 1 << 31);
    assert_eq!(LittleEndian::read_u32(&bytes[144 + 77 * 4..148 + 77 * 4]), 12);
    assert!(bytes[456..].iter().all(|&b| b == 0));

    let decoded = OutputHeader::decode(&bytes).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn test_output_header_decode_errors() {
    assert!(matches!(
        OutputHeader::decode(&[0; 100]),
        Err(HeaderError::TooShort { got: 100 })
    ));
    assert!(matches!(
        OutputHeader::decode(&[0; HEADER_SIZE]),
        Err(HeaderError::InvalidMagic { got: 0, .. })
    ));
}

#[test]
fn test_output_header_from_input() {
    let mut input = InputHeader {
        start_time: 5.0,
        end_time: 6.0,
        ..Default::default()
    };
    for (i, w) in input.weights.iter_mut().enumerate() {
        *w = i as u32;
    }
    let header = OutputHeader::from_input(&input, 300, 288, 63, 1);
    assert_eq!(header.magic, OUTPUT_MAGIC);
    assert_eq!(header.subband, 300);
    assert_eq!(header.num_dipoles, 288);
    assert_eq!(header.num_channels, 64);
    assert_eq!(header.polarisation, 1);
    assert_eq!(header.polarisation_name(), "YY");
    assert_eq!(header.flagged_channels, 1);
    assert!(header.is_channel_flagged(0));
    assert!(!header.is_channel_flagged(1));
    assert_eq!(header.num_flagged_dipoles(), 0);
    assert_eq!(header.active_sources, 0);
    assert_eq!(header.weights[77], 77);
    assert_abs_diff_eq!(header.central_time(), 5.5);
}

#[test]
fn test_source_bits() {
    let mut header = OutputHeader::default();
    header.set_source_active(2, true);
    assert!(header.is_source_active(2));
    header.set_source_active(2, false);
    assert!(!header.is_source_active(2));
    assert_eq!(header.active_sources, 0);
}

#[test]
fn test_frame_reset_and_release() {
    let layout = small_layout();
    let mut buffer = FrameBuffer::new(&layout);
    assert_eq!(buffer.vis.len(), 55 * 4);
    buffer.header.subband = 42;
    buffer.vis[3] = c32::new(1.0, 2.0);

    let mut frame = Frame::from_buffer(layout, buffer);
    assert_eq!(frame.header.subband, 42);
    assert_eq!(frame.vis_view()[(0, 3)], c32::new(1.0, 2.0));
    assert_eq!(frame.acm.dim(), (10, 10));
    assert_eq!(frame.mask, Array2::<f32>::eye(10));

    frame.acm.fill(c32::new(1.0, 0.0));
    frame.flag_antenna(3);
    frame.calibration = Some(CalibrationReport {
        gains: Array1::zeros(10),
        fluxes: vec![],
        converged: true,
        major_cycles: 1,
    });

    let buffer = frame.release();
    assert_eq!(buffer.header.subband, 42);
    assert_eq!(buffer.vis.len(), 55 * 4);
    assert!(frame.vis.is_empty());

    frame.reset(FrameBuffer::new(&layout));
    assert!(frame.flagged.is_empty());
    assert!(frame.calibration.is_none());
    assert_eq!(frame.mask, Array2::<f32>::eye(10));
    assert!(frame.acm.iter().all(|v| *v == c32::default()));
    assert_eq!(frame.header.num_flagged_dipoles(), 0);
}

#[test]
fn test_flag_antenna() {
    let layout = small_layout();
    let mut frame = Frame::from_buffer(layout, FrameBuffer::new(&layout));
    frame.acm.fill(c32::new(2.0, 1.0));
    frame.flag_antenna(7);
    frame.flag_antenna(2);
    frame.flag_antenna(7);

    assert_eq!(frame.flagged, vec![2, 7]);
    assert!(frame.is_flagged(7));
    assert!(!frame.is_flagged(3));
    assert!(frame.header.is_dipole_flagged(2));
    assert!(frame.header.is_dipole_flagged(7));
    assert_eq!(frame.header.num_flagged_dipoles(), 2);
    for i in 0..10 {
        assert_eq!(frame.acm[(7, i)], c32::default());
        assert_eq!(frame.acm[(i, 7)], c32::default());
        assert_abs_diff_eq!(frame.mask[(7, i)], 1.0);
        assert_abs_diff_eq!(frame.mask[(i, 2)], 1.0);
    }
    assert_eq!(frame.acm[(0, 1)], c32::new(2.0, 1.0));
    assert_abs_diff_eq!(frame.mask[(0, 1)], 0.0);
}

#[test]
fn test_frame_validity_threshold() {
    let layout = small_layout();
    let mut frame = Frame::from_buffer(layout, FrameBuffer::new(&layout));
    assert!(frame.is_valid());
    frame.flag_antenna(0);
    assert!(frame.is_valid());
    // Exactly 20% is not valid.
    frame.flag_antenna(1);
    assert!(!frame.is_valid());

    let layout = ArrayLayout::default();
    let mut frame = Frame::from_buffer(layout, FrameBuffer::new(&layout));
    for a in 0..57 {
        frame.flag_antenna(a);
    }
    assert!(frame.is_valid());
    frame.flag_antenna(57);
    assert!(!frame.is_valid());
}

#[test]
fn test_serialize() {
    let layout = small_layout();
    let mut frame = Frame::from_buffer(layout, FrameBuffer::new(&layout));
    frame.header.subband = 9;
    frame.acm[(0, 0)] = c32::new(1.5, 0.0);
    frame.acm[(1, 0)] = c32::new(0.25, -3.0);

    let mut bytes = vec![];
    frame.serialize(&mut bytes);
    assert_eq!(bytes.len(), layout.output_frame_size());
    assert_eq!(bytes.len(), 512 + 100 * 8);

    let header = OutputHeader::decode(&bytes).unwrap();
    assert_eq!(header.subband, 9);
    assert_abs_diff_eq!(LittleEndian::read_f32(&bytes[512..516]), 1.5);
    // Row 1, column 0 is element 10.
    let offset = 512 + 10 * 8;
    assert_abs_diff_eq!(LittleEndian::read_f32(&bytes[offset..offset + 4]), 0.25);
    assert_abs_diff_eq!(LittleEndian::read_f32(&bytes[offset + 4..offset + 8]), -3.0);
}

#[test]
fn test_display() {
    let layout = small_layout();
    let mut frame = Frame::from_buffer(layout, FrameBuffer::new(&layout));
    frame.header.subband = 296;
    frame.header.end_time = 100.0;
    frame.header.flag_channel(0);
    frame.header.source_fluxes[0] = 1.0;
    frame.flag_antenna(4);
    assert_eq!(
        frame.to_string(),
        "296 100.0 XX 1 1 1.000 0.000 0.000 0.000 0.000"
    );
}
