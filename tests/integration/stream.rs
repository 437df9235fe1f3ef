// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Correlator bytes in, processed frames out.

use std::{
    io::Cursor,
    sync::{Arc, Mutex},
};

use rtcal::{
    constants::HEADER_SIZE,
    frame::HeaderError,
    pipeline::{Sink, SinkError},
    stages::flag::ChannelRange,
    stream::StreamReader,
    BufferPool, Flagger, Pipeline, Stage, Weighter,
};

use super::*;

#[derive(Clone, Default)]
struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl Sink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.0.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }
}

fn small_layout() -> ArrayLayout {
    ArrayLayout {
        num_stations: 2,
        antennas_per_station: 2,
        num_channels: 3,
    }
}

/// A correlator frame where every sample of pol 0 is `1 + i` and every sample
/// of pol 1 is `2`.
fn correlator_frame(layout: &ArrayLayout, start_time: f64) -> Vec<u8> {
    let mut header = InputHeader {
        start_time,
        end_time: start_time + 1.0,
        ..Default::default()
    };
    header.weights[..layout.num_station_pairs()].fill(10);
    let mut bytes = header.encode().to_vec();
    for _ in 0..layout.samples_per_polarisation() {
        for v in [c32::new(1.0, 1.0), c32::new(2.0, 0.0)] {
            bytes.extend_from_slice(&v.re.to_le_bytes());
            bytes.extend_from_slice(&v.im.to_le_bytes());
        }
    }
    bytes
}

#[test]
fn test_stream_through_pipeline() -> Result<(), HeaderError> {
    let layout = small_layout();
    let num_frames = 5;
    let bytes: Vec<u8> = (0..num_frames)
        .flat_map(|i| correlator_frame(&layout, 1000.0 + i as f64))
        .collect();

    let sink = MemorySink::default();
    let pool = BufferPool::new(&layout, 2);
    let stages = vec![
        Stage::Weight(Weighter),
        Stage::Flag(Flagger::new(
            4.0,
            3.0,
            &[ChannelRange { start: 0, end: 2 }],
            &layout,
        )),
    ];
    let pipeline = Pipeline::start(
        layout,
        stages,
        vec![Box::new(sink.clone())],
        1,
        pool.clone(),
    );

    let mut reader = StreamReader::new(
        Cursor::new(bytes),
        layout,
        SUBBAND,
        pool.clone(),
        pipeline.submitter(),
    );
    let stats = reader.run().unwrap();
    drop(reader);
    assert_eq!(stats.frames, num_frames);
    assert_eq!(pipeline.stop(), 2 * num_frames);
    assert_eq!(pool.available(), pool.capacity());

    let output = sink.0.lock().unwrap();
    let frame_size = layout.output_frame_size();
    assert_eq!(output.len(), 2 * num_frames as usize * frame_size);

    let n = layout.num_antennas();
    for (i, frame) in output.chunks_exact(frame_size).enumerate() {
        let header = OutputHeader::decode(frame)?;
        assert_eq!(header.subband, SUBBAND);
        assert_eq!(header.num_dipoles, n as i32);
        assert_eq!(header.num_channels, 4);
        assert_eq!(header.polarisation, (i % 2) as i32);
        assert_eq!(header.start_time, 1000.0 + (i / 2) as f64);
        assert_eq!(header.weights[0], 10);
        // Channel 0 is never delivered; the rest are fine.
        assert_eq!(header.num_flagged_channels(), 1);
        assert_eq!(header.num_flagged_dipoles(), 0);

        // The ACM follows the header.
        let expected = if i % 2 == 0 {
            c32::new(1.0, 1.0)
        } else {
            c32::new(2.0, 0.0)
        };
        let acm: Vec<c32> = frame[HEADER_SIZE..]
            .chunks_exact(8)
            .map(|c| {
                c32::new(
                    f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                )
            })
            .collect();
        assert_eq!(acm.len(), n * n);
        for a1 in 0..n {
            for a2 in 0..n {
                let v = acm[a1 * n + a2];
                let want = match a1.cmp(&a2) {
                    std::cmp::Ordering::Greater => expected,
                    std::cmp::Ordering::Less => expected.conj(),
                    std::cmp::Ordering::Equal => c32::new(expected.re, 0.0),
                };
                assert_eq!(v, want, "baseline ({a1}, {a2})");
            }
        }
    }

    Ok(())
}
