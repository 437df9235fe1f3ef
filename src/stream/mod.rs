// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading correlator frames from a byte stream.
//!
//! Every correlator frame is a 512-byte [`InputHeader`] followed by the
//! visibilities of both polarisations, interleaved sample by sample. The
//! samples are split into one [`FrameBuffer`] per polarisation, which are
//! submitted to the pipeline XX first, then YY.

mod error;

pub use error::StreamError;

use std::{
    io::{ErrorKind, Read},
    time::{Duration, Instant},
};

use log::{info, trace};

use crate::{
    constants::{HEADER_SIZE, INPUT_MAGIC},
    frame::{ArrayLayout, FrameBuffer, InputHeader, OutputHeader},
    pipeline::{BufferPool, Submitter},
};

// Wire samples are copied straight into `c32` buffers.
#[cfg(target_endian = "big")]
compile_error!("correlator streams can only be read on little-endian hosts");

/// The size of one complex sample of one polarisation \[bytes\].
const SAMPLE_SIZE: usize = 8;

/// Split interleaved dual-polarisation samples.
///
/// `src` holds pairs of 8-byte complex samples (pol0, pol1, pol0, pol1, ...).
/// The even samples are written to `pol0` and the odd ones to `pol1`, starting
/// `offset` samples into each. Sample order is preserved.
pub fn deinterleave(src: &[u8], pol0: &mut [u8], pol1: &mut [u8], offset: usize) {
    debug_assert_eq!(src.len() % (2 * SAMPLE_SIZE), 0);
    let start = offset * SAMPLE_SIZE;
    let end = start + src.len() / 2;
    src.chunks_exact(2 * SAMPLE_SIZE)
        .zip(pol0[start..end].chunks_exact_mut(SAMPLE_SIZE))
        .zip(pol1[start..end].chunks_exact_mut(SAMPLE_SIZE))
        .for_each(|((pair, p0), p1)| {
            p0.copy_from_slice(&pair[..SAMPLE_SIZE]);
            p1.copy_from_slice(&pair[SAMPLE_SIZE..]);
        });
}

/// What happened over the life of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamStats {
    /// Complete correlator frames read.
    pub frames: u64,

    /// All bytes read, including partial frames.
    pub bytes: u64,

    pub elapsed: Duration,
}

impl StreamStats {
    /// \[gigabits/second\]
    pub fn gbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 * 8.0 / (secs * 1e9)
        } else {
            0.0
        }
    }
}

pub struct StreamReader<R: Read> {
    reader: R,
    layout: ArrayLayout,
    subband: i32,
    pool: BufferPool,
    submitter: Submitter,

    /// Scratch space for one chunk of interleaved samples.
    chunk: Vec<u8>,

    stats: StreamStats,
}

impl<R: Read> StreamReader<R> {
    pub fn new(
        reader: R,
        layout: ArrayLayout,
        subband: i32,
        pool: BufferPool,
        submitter: Submitter,
    ) -> StreamReader<R> {
        // A chunk holds `num_baselines` sample pairs, so the payload is
        // exactly `num_channels` chunks.
        let chunk = vec![0; layout.num_baselines() * 2 * SAMPLE_SIZE];
        StreamReader {
            reader,
            layout,
            subband,
            pool,
            submitter,
            chunk,
            stats: StreamStats::default(),
        }
    }

    /// Read frames until the other end disconnects between frames (`Ok`) or
    /// something goes wrong.
    pub fn run(&mut self) -> Result<StreamStats, StreamError> {
        let start = Instant::now();
        let result = self.read_frames();
        self.stats.elapsed = start.elapsed();
        info!(
            "Read {} frames ({} bytes) in {:.2?}; throughput {:.3} Gb/s",
            self.stats.frames,
            self.stats.bytes,
            self.stats.elapsed,
            self.stats.gbps()
        );
        result.map(|()| self.stats)
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    fn read_frames(&mut self) -> Result<(), StreamError> {
        while let Some(input) = self.read_header()? {
            if !input.has_valid_magic() {
                return Err(StreamError::InvalidMagic {
                    expected: INPUT_MAGIC,
                    got: input.magic,
                });
            }

            let (mut pol0, mut pol1) = self.pool.acquire_pair();
            if let Err(e) = self.read_payload(&mut pol0, &mut pol1) {
                self.pool.release(pol0);
                self.pool.release(pol1);
                return Err(e);
            }

            let num_antennas = self.layout.num_antennas();
            let num_channels = self.layout.num_channels;
            pol0.header =
                OutputHeader::from_input(&input, self.subband, num_antennas, num_channels, 0);
            pol1.header =
                OutputHeader::from_input(&input, self.subband, num_antennas, num_channels, 1);
            trace!(
                "Frame {} complete ({:.3} - {:.3})",
                self.stats.frames,
                input.start_time,
                input.end_time
            );

            if let Err(pol0) = self.submitter.submit(pol0) {
                self.pool.release(pol0);
                self.pool.release(pol1);
                return Err(StreamError::PipelineClosed);
            }
            if let Err(pol1) = self.submitter.submit(pol1) {
                self.pool.release(pol1);
                return Err(StreamError::PipelineClosed);
            }
            self.stats.frames += 1;
        }
        Ok(())
    }

    /// `None` if the stream ends cleanly before the header starts.
    fn read_header(&mut self) -> Result<Option<InputHeader>, StreamError> {
        let mut bytes = [0; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            match self.reader.read(&mut bytes[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(StreamError::TruncatedHeader {
                        got: filled,
                        expected: HEADER_SIZE,
                    })
                }
                Ok(n) => {
                    filled += n;
                    self.stats.bytes += n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(InputHeader::decode(&bytes)))
    }

    fn read_payload(
        &mut self,
        pol0: &mut FrameBuffer,
        pol1: &mut FrameBuffer,
    ) -> Result<(), StreamError> {
        let pol0_bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut pol0.vis);
        let pol1_bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut pol1.vis);
        let samples_per_chunk = self.layout.num_baselines();
        for i_chunk in 0..self.layout.num_channels {
            self.reader.read_exact(&mut self.chunk)?;
            self.stats.bytes += self.chunk.len() as u64;
            deinterleave(
                &self.chunk,
                pol0_bytes,
                pol1_bytes,
                i_chunk * samples_per_chunk,
            );
        }
        Ok(())
    }
}
