// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The TCP server that accepts correlator connections and feeds the pipeline.

use std::{
    io::Read,
    net::{Ipv4Addr, TcpListener, TcpStream},
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{error, info, warn};
use vec1::Vec1;

use crate::{
    antenna::AntennaPositions,
    frame::ArrayLayout,
    pipeline::{BufferPool, OutputSpec, Pipeline, Submitter},
    stages::{
        calibrate::Calibrator,
        flag::{ChannelRange, Flagger},
        weight::Weighter,
        Stage,
    },
    stream::{StreamReader, StreamStats},
    RtcalError,
};

/// Everything needed to run a server, validated.
#[derive(Debug, Clone)]
pub struct ServeParams {
    pub layout: ArrayLayout,
    pub subband: i32,
    pub channels: Vec1<ChannelRange>,
    pub ant_sigma: f32,
    pub vis_sigma: f32,
    pub positions: Arc<AntennaPositions>,

    /// Frames per polarisation that can be in flight.
    pub buffer_depth: usize,

    pub num_threads: usize,
    pub port: u16,
    pub outputs: Vec<OutputSpec>,
}

impl ServeParams {
    /// Weighting, flagging then calibration.
    pub fn stages(&self) -> Vec<Stage> {
        vec![
            Stage::Weight(Weighter),
            Stage::Flag(Flagger::new(
                self.ant_sigma,
                self.vis_sigma,
                &self.channels,
                &self.layout,
            )),
            Stage::Calibrate(Calibrator::new(Arc::clone(&self.positions))),
        ]
    }

    /// Start the pipeline, then serve correlator connections until accepting
    /// one fails. The pipeline is drained before returning.
    pub fn run(&self) -> Result<(), RtcalError> {
        let sinks = self
            .outputs
            .iter()
            .map(OutputSpec::open)
            .collect::<Result<Vec<_>, _>>()?;
        let pool = BufferPool::new(&self.layout, self.buffer_depth);
        let pipeline = Pipeline::start(
            self.layout,
            self.stages(),
            sinks,
            self.num_threads,
            pool.clone(),
        );

        // The socket receive buffer can't be enlarged with std alone, so the
        // kernel default (or net.core.rmem_default) applies.
        let listener = match TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.port)) {
            Ok(l) => l,
            Err(e) => {
                pipeline.stop();
                return Err(e.into());
            }
        };
        info!("Listening for correlator connections on port {}", self.port);

        let mut connections: Vec<JoinHandle<()>> = vec![];
        let result = loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!("Accepted a connection from {peer}");
                    let handle = self.spawn_connection(stream, &pool, pipeline.submitter());
                    connections.push(handle);
                }
                Err(e) => {
                    error!("Couldn't accept a connection: {e}; shutting down");
                    break Err(e);
                }
            }
            connections.retain(|h| !h.is_finished());
        };

        for handle in connections {
            if handle.join().is_err() {
                error!("A connection thread panicked");
            }
        }
        pipeline.stop();
        result.map_err(RtcalError::from)
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        pool: &BufferPool,
        submitter: Submitter,
    ) -> JoinHandle<()> {
        let layout = self.layout;
        let subband = self.subband;
        let pool = pool.clone();
        let name = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        thread::Builder::new()
            .name(format!("conn-{name}"))
            .spawn(move || {
                handle_connection(stream, layout, subband, pool, submitter, &name);
            })
            .expect("OS can create threads")
    }
}

/// Read one connection to its end. A corrupt stream aborts the process; any
/// other failure only ends the connection.
pub fn handle_connection<R: Read>(
    reader: R,
    layout: ArrayLayout,
    subband: i32,
    pool: BufferPool,
    submitter: Submitter,
    name: &str,
) -> Option<StreamStats> {
    let mut reader = StreamReader::new(reader, layout, subband, pool, submitter);
    match reader.run() {
        Ok(stats) => {
            info!("{name} disconnected after {} frames", stats.frames);
            Some(stats)
        }
        Err(e) if e.is_fatal() => {
            error!("{name}: {e}");
            std::process::abort();
        }
        Err(e) => {
            warn!("{name}: {e}; closing the connection");
            None
        }
    }
}
