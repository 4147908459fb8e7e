//! Background octant loading.
//!
//! Requests travel to a fixed set of worker threads over a bounded channel
//! and results come back over an unbounded one. The render thread never
//! blocks on either: it submits with `try_send` and drains with `try_recv`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use log::{debug, warn};
use pcloud_core::codec::RawPointCodec;
use pcloud_core::container::PointCloud;
use pcloud_core::point::PointFields;
use pcloud_core::status::{PointCloudError, PointCloudResult};
use pcloud_octree::payload::load_octant;
use pcloud_octree::{Octant, OctantIndex, PayloadSource};

#[derive(Debug, Clone)]
pub(crate) struct LoadRequest {
    pub index: OctantIndex,
    pub generation: u32,
    pub octant: Octant,
}

#[derive(Debug)]
pub(crate) enum LoadOutcome<P> {
    Loaded(PointCloud<P>),
    Failed(PointCloudError),
    /// Skipped because the pool is shutting down.
    Cancelled,
}

#[derive(Debug)]
pub(crate) struct LoadCompletion<P> {
    pub index: OctantIndex,
    pub generation: u32,
    pub outcome: LoadOutcome<P>,
}

pub(crate) struct WorkerPool<P> {
    requests: Option<Sender<LoadRequest>>,
    completions: Receiver<LoadCompletion<P>>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl<P: PointFields> WorkerPool<P> {
    pub fn spawn(
        threads: usize,
        queue_capacity: usize,
        codec: Arc<RawPointCodec>,
        source: Arc<dyn PayloadSource>,
    ) -> PointCloudResult<Self> {
        let (request_tx, request_rx) = bounded::<LoadRequest>(queue_capacity.max(1));
        let (completion_tx, completion_rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads.max(1) {
            let requests = request_rx.clone();
            let completions = completion_tx.clone();
            let shutdown = Arc::clone(&shutdown);
            let codec = Arc::clone(&codec);
            let source = Arc::clone(&source);
            let handle = thread::Builder::new()
                .name(format!("octant-loader-{}", i))
                .spawn(move || {
                    worker_loop(&requests, &completions, &shutdown, &codec, source.as_ref())
                })?;
            handles.push(handle);
        }
        debug!("Started {} octant loader threads", handles.len());

        Ok(Self {
            requests: Some(request_tx),
            completions: completion_rx,
            shutdown,
            handles,
        })
    }

    pub fn has_capacity(&self) -> bool {
        self.requests.as_ref().is_some_and(|tx| !tx.is_full())
    }

    /// Queues a request without blocking. Returns false if the queue is full
    /// or the pool has stopped.
    pub fn try_submit(&self, request: LoadRequest) -> bool {
        let Some(tx) = &self.requests else {
            return false;
        };
        match tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(r)) => {
                debug!("Load queue full, deferring octant {}", r.octant.id);
                false
            }
            Err(TrySendError::Disconnected(r)) => {
                warn!("Load workers are gone, dropping request for {}", r.octant.id);
                false
            }
        }
    }

    /// Completions received so far.
    pub fn drain(&self) -> Vec<LoadCompletion<P>> {
        self.completions.try_iter().collect()
    }

    /// Workers answer queued requests with `Cancelled` from now on.
    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Stops accepting requests and waits for all workers to exit.
    pub fn join(&mut self) {
        self.signal_shutdown();
        self.requests = None;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("An octant loader thread panicked");
            }
        }
    }
}

impl<P> Drop for WorkerPool<P> {
    fn drop(&mut self) {
        // Workers exit once the request channel disconnects. Not joined here:
        // a worker may be blocked in a slow read.
        self.shutdown.store(true, Ordering::SeqCst);
        self.requests = None;
    }
}

fn worker_loop<P: PointFields>(
    requests: &Receiver<LoadRequest>,
    completions: &Sender<LoadCompletion<P>>,
    shutdown: &AtomicBool,
    codec: &RawPointCodec,
    source: &dyn PayloadSource,
) {
    for request in requests.iter() {
        let outcome = if shutdown.load(Ordering::SeqCst) {
            LoadOutcome::Cancelled
        } else {
            match load_octant(source, codec, &request.octant) {
                Ok(cloud) => LoadOutcome::Loaded(cloud),
                Err(e) => LoadOutcome::Failed(e.into_load_failure(request.octant.id.to_string())),
            }
        };
        let completion = LoadCompletion {
            index: request.index,
            generation: request.generation,
            outcome,
        };
        if completions.send(completion).is_err() {
            // The loader is gone.
            break;
        }
    }
}
