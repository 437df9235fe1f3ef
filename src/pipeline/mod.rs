// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Worker threads that run the processing stages over submitted frames.
//!
//! Frame storage is allocated once, up front, by a [`BufferPool`]. A stream
//! reader acquires buffers from the pool, fills them and submits them; a
//! worker installs each buffer into its own [`Frame`], runs every [`Stage`]
//! in order, writes the result to the sinks and returns the buffer to the
//! pool. Nothing allocates per frame.

mod error;
pub mod sink;

pub use error::SinkError;
pub use sink::{FileSink, OutputSpec, Sink, TcpSink};

use std::{
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{bounded, Receiver, Sender};
use crossbeam_utils::atomic::AtomicCell;
use log::{debug, error, info, trace};

use crate::{
    frame::{ArrayLayout, Frame, FrameBuffer},
    stages::Stage,
};

/// A fixed set of pre-allocated [`FrameBuffer`]s. Cloning the pool gives
/// another handle to the same buffers.
#[derive(Clone)]
pub struct BufferPool {
    tx: Sender<FrameBuffer>,
    rx: Receiver<FrameBuffer>,
    capacity: usize,

    /// Held while a pair is being taken, so that concurrent readers never
    /// each end up holding one half of a pair.
    pair_lock: Arc<Mutex<()>>,
}

impl BufferPool {
    /// Allocate `depth` buffers for each of the two polarisations. Readers
    /// take buffers a pair at a time ([`BufferPool::acquire_pair`]), so any
    /// number of connections can share a pool of any depth; a deeper pool
    /// only lets more frames be in flight at once.
    pub fn new(layout: &ArrayLayout, depth: usize) -> BufferPool {
        let capacity = depth.max(1) * 2;
        let (tx, rx) = bounded(capacity);
        for _ in 0..capacity {
            tx.send(FrameBuffer::new(layout))
                .expect("the pool's channel has room for all its buffers");
        }
        debug!(
            "Allocated {capacity} frame buffers ({} MiB)",
            capacity * layout.samples_per_polarisation() * std::mem::size_of::<crate::c32>()
                / 1024
                / 1024
        );
        BufferPool {
            tx,
            rx,
            capacity,
            pair_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Take a buffer, blocking until one is free.
    pub fn acquire(&self) -> FrameBuffer {
        self.rx
            .recv()
            .expect("the pool holds its own sender, so its channel never disconnects")
    }

    /// Take two buffers, one for each polarisation of a frame, blocking until
    /// both are free.
    pub fn acquire_pair(&self) -> (FrameBuffer, FrameBuffer) {
        let _guard = self.pair_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let pol0 = self.acquire();
        let pol1 = self.acquire();
        (pol0, pol1)
    }

    /// Take a buffer if one is free right now.
    pub fn try_acquire(&self) -> Option<FrameBuffer> {
        self.rx.try_recv().ok()
    }

    pub fn release(&self, buffer: FrameBuffer) {
        // Only buffers taken from this pool come back, so there is always room.
        if self.tx.try_send(buffer).is_err() {
            error!("A frame buffer was returned to a full pool; dropping it");
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of buffers currently free.
    pub fn available(&self) -> usize {
        self.rx.len()
    }
}

/// A handle for submitting filled buffers to a [`Pipeline`].
#[derive(Clone)]
pub struct Submitter {
    queue: Sender<FrameBuffer>,
}

impl Submitter {
    pub(crate) fn new(queue: Sender<FrameBuffer>) -> Submitter {
        Submitter { queue }
    }

    /// Queue a buffer for processing. If the pipeline has stopped, the buffer
    /// is handed back.
    pub fn submit(&self, buffer: FrameBuffer) -> Result<(), FrameBuffer> {
        self.queue.send(buffer).map_err(|e| e.into_inner())
    }
}

pub struct Pipeline {
    submitter: Option<Submitter>,
    workers: Vec<JoinHandle<()>>,
    processed: Arc<AtomicCell<u64>>,
}

impl Pipeline {
    /// Spawn `num_threads` workers, each running `stages` in order over the
    /// frames they receive and writing the results to `sinks`. Sinks that fail
    /// are dropped.
    pub fn start(
        layout: ArrayLayout,
        stages: Vec<Stage>,
        sinks: Vec<Box<dyn Sink>>,
        num_threads: usize,
        pool: BufferPool,
    ) -> Pipeline {
        let (tx, rx) = bounded(pool.capacity());
        let stages = Arc::new(stages);
        let sinks: Arc<Vec<SinkSlot>> =
            Arc::new(sinks.into_iter().map(|s| Mutex::new(Some(s))).collect());
        let processed = Arc::new(AtomicCell::new(0_u64));

        info!(
            "Starting {} pipeline worker(s) with stages: {}",
            num_threads.max(1),
            stages.iter().map(Stage::name).collect::<Vec<_>>().join(", ")
        );
        let workers = (0..num_threads.max(1))
            .map(|i| {
                let rx: Receiver<FrameBuffer> = rx.clone();
                let stages = Arc::clone(&stages);
                let sinks = Arc::clone(&sinks);
                let processed = Arc::clone(&processed);
                let pool = pool.clone();
                thread::Builder::new()
                    .name(format!("worker{i}"))
                    .spawn(move || {
                        let mut frame = Frame::new(layout);
                        let mut bytes = Vec::with_capacity(layout.output_frame_size());
                        for buffer in rx.iter() {
                            frame.reset(buffer);
                            for stage in stages.iter() {
                                stage.run(&mut frame);
                            }
                            debug!("{frame}");

                            frame.serialize(&mut bytes);
                            write_to_sinks(&sinks, &bytes);
                            processed.fetch_add(1);
                            pool.release(frame.release());
                        }
                        trace!("worker{i} finished");
                    })
                    .expect("OS can create threads")
            })
            .collect();

        Pipeline {
            submitter: Some(Submitter::new(tx)),
            workers,
            processed,
        }
    }

    pub fn submit(&self, buffer: FrameBuffer) -> Result<(), FrameBuffer> {
        self.submitter().submit(buffer)
    }

    /// Another handle for submitting buffers, e.g. for a connection thread.
    /// The workers only finish once all of these have been dropped.
    pub fn submitter(&self) -> Submitter {
        self.submitter
            .clone()
            .expect("the submitter is only taken when stopping")
    }

    /// The number of frames processed so far.
    pub fn num_processed(&self) -> u64 {
        self.processed.load()
    }

    /// Close the queue, let the workers drain it and wait for them. Returns the
    /// number of frames processed.
    pub fn stop(mut self) -> u64 {
        drop(self.submitter.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("A pipeline worker panicked");
            }
        }
        let processed = self.processed.load();
        info!("Pipeline stopped after {processed} frames");
        processed
    }
}

/// A sink and its lock. The sink is taken out when it fails.
type SinkSlot = Mutex<Option<Box<dyn Sink>>>;

/// Each sink is locked only for its own write, so a frame's bytes are never
/// interleaved with another's, and a worker stuck on a slow sink only holds
/// up the workers waiting on that same sink.
fn write_to_sinks(sinks: &[SinkSlot], bytes: &[u8]) {
    for slot in sinks {
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sink) = slot.as_mut() {
            if let Err(e) = sink.write(bytes) {
                error!("{e}; no longer writing to {}", sink.name());
                *slot = None;
            }
        }
    }
}
