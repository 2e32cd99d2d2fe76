// src/renderer/worker.rs
//! RenderWorkerPool - fixed set of threads running the extraction transform.
//!
//! Work queue pattern: each worker receives a whole `Frame`, renders its
//! output buffer, and returns the same `Frame`. Workers never see viewports
//! or rulers and never allocate or free frames.
//!
//! Threading model:
//! - One inbox per worker, `SyncSender` with capacity 1, so a worker has at
//!   most one frame in flight.
//! - One shared result channel sized to the pool, so a worker never blocks
//!   handing a frame back.
//! - Dropping the pool closes every inbox and joins the threads.

use super::render_frame;
use crate::error::{Result, ZoomerError};
use crate::frame::Frame;
use log::*;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Work item sent to a render thread.
pub struct RenderWork {
    /// Scheduler epoch the frame was dispatched in.
    pub epoch: u64,
    pub frame: Frame,
}

/// Frame returned from a render thread with its output populated.
pub struct RenderResult {
    pub worker_id: usize,
    pub epoch: u64,
    pub frame: Frame,
}

pub struct RenderWorkerPool {
    /// `None` once a worker is known to be gone.
    inboxes: Vec<Option<SyncSender<RenderWork>>>,
    busy: Vec<bool>,
    results: Receiver<RenderResult>,
    handles: Vec<JoinHandle<()>>,
}

impl RenderWorkerPool {
    /// Spawns `num_workers` render threads.
    pub fn spawn(num_workers: usize) -> Result<Self> {
        let (result_tx, result_rx) = sync_channel(num_workers.max(1));
        let mut pool = RenderWorkerPool {
            inboxes: Vec::with_capacity(num_workers),
            busy: Vec::with_capacity(num_workers),
            results: result_rx,
            handles: Vec::with_capacity(num_workers),
        };

        for id in 0..num_workers {
            let (work_tx, work_rx) = sync_channel(1);
            let result_tx = result_tx.clone();
            // On failure `pool` is dropped here, which joins the workers
            // already spawned.
            let handle = thread::Builder::new()
                .name(format!("render-worker-{}", id))
                .spawn(move || run_worker(id, work_rx, result_tx))
                .map_err(ZoomerError::WorkerSpawn)?;
            pool.inboxes.push(Some(work_tx));
            pool.busy.push(false);
            pool.handles.push(handle);
        }

        info!("RenderWorkerPool: Spawned {} render workers", num_workers);
        Ok(pool)
    }

    /// Hands `frame` to an idle worker. Gives the frame back when every
    /// worker is busy or gone.
    pub fn try_dispatch(&mut self, frame: Frame, epoch: u64) -> std::result::Result<(), Frame> {
        self.reap_dead();

        let mut frame = frame;
        for id in 0..self.inboxes.len() {
            if self.busy[id] {
                continue;
            }
            let Some(inbox) = &self.inboxes[id] else {
                continue;
            };
            frame.dispatched_at = Some(Instant::now());
            match inbox.try_send(RenderWork { epoch, frame }) {
                Ok(()) => {
                    trace!("RenderWorkerPool: Dispatched frame to worker {}", id);
                    self.busy[id] = true;
                    return Ok(());
                }
                Err(TrySendError::Full(work)) => {
                    self.busy[id] = true;
                    frame = work.frame;
                }
                Err(TrySendError::Disconnected(work)) => {
                    warn!("RenderWorkerPool: Worker {} is gone, dropping it from the pool", id);
                    self.inboxes[id] = None;
                    frame = work.frame;
                }
            }
        }
        frame.dispatched_at = None;
        Err(frame)
    }

    /// Returns a finished frame if one is waiting. Never blocks.
    pub fn try_collect(&mut self) -> Option<RenderResult> {
        match self.results.try_recv() {
            Ok(mut result) => {
                if let Some(busy) = self.busy.get_mut(result.worker_id) {
                    *busy = false;
                }
                if let Some(sent) = result.frame.dispatched_at.take() {
                    result.frame.time_round_trip = sent.elapsed();
                }
                trace!(
                    "RenderWorkerPool: Collected frame {} from worker {}",
                    result.frame.frame_nr,
                    result.worker_id
                );
                Some(result)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Frames currently held by workers.
    pub fn in_flight(&self) -> usize {
        self.busy.iter().filter(|&&b| b).count()
    }

    /// Workers still able to take work.
    pub fn live_workers(&self) -> usize {
        self.inboxes.iter().filter(|i| i.is_some()).count()
    }

    /// A worker whose thread ended (it panicked mid-render) keeps its frame;
    /// forget it so dispatch stops waiting on it.
    fn reap_dead(&mut self) {
        for (id, handle) in self.handles.iter().enumerate() {
            if self.inboxes[id].is_some() && handle.is_finished() {
                warn!("RenderWorkerPool: Worker {} exited unexpectedly", id);
                self.inboxes[id] = None;
                self.busy[id] = false;
            }
        }
    }
}

impl Drop for RenderWorkerPool {
    fn drop(&mut self) {
        let in_flight = self.in_flight();
        if in_flight > 0 {
            debug!(
                "RenderWorkerPool: Shutting down with {} frames in flight",
                in_flight
            );
        }
        self.inboxes.clear();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("RenderWorkerPool: A worker panicked");
            }
        }
        info!("RenderWorkerPool: All render workers stopped");
    }
}

fn run_worker(id: usize, inbox: Receiver<RenderWork>, results: SyncSender<RenderResult>) {
    debug!("RenderWorker {}: Thread started", id);

    while let Ok(RenderWork { epoch, mut frame }) = inbox.recv() {
        trace!("RenderWorker {}: Rendering frame {}", id, frame.frame_nr);
        render_frame(&mut frame);
        let result = RenderResult {
            worker_id: id,
            epoch,
            frame,
        };
        if results.send(result).is_err() {
            debug!("RenderWorker {}: Result channel closed, exiting", id);
            break;
        }
    }

    debug!("RenderWorker {}: Thread stopped", id);
}
