//! Single background worker thread: drains eviction and journal-rebuild requests off the
//! caller's critical section, per spec §5/§9's "single-thread executor" design note.
//!
//! The channel is processed strictly in FIFO order by one consumer, which is what gives
//! `Cache::flush` its drain semantics: a `Flush` message queued after an `Evict`/`Rebuild` is
//! only acknowledged once those earlier messages have been handled.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::cache::Shared;

pub(crate) enum WorkerMessage {
    Evict,
    Rebuild,
    Flush(Sender<()>),
    Shutdown(Sender<()>),
}

/// A cheap, cloneable sender half; every [`crate::Cache`], [`crate::Editor`], and
/// [`crate::Snapshot`] handle that shares a cache directory holds one of these.
#[derive(Clone)]
pub(crate) struct WorkerHandle {
    sender: Sender<WorkerMessage>,
}

impl WorkerHandle {
    pub fn notify_evict(&self) {
        let _ = self.sender.send(WorkerMessage::Evict);
    }

    pub fn notify_rebuild(&self) {
        let _ = self.sender.send(WorkerMessage::Rebuild);
    }

    /// Blocks until every message enqueued before this call has been processed.
    pub fn drain(&self) {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.sender.send(WorkerMessage::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Tells the worker to exit its loop, blocking until it acknowledges.
    pub fn shutdown(&self) {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.sender.send(WorkerMessage::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

/// Spawns the worker thread and returns a handle to it plus its join handle.
pub(crate) fn spawn(shared: Arc<Mutex<Shared>>) -> (WorkerHandle, thread::JoinHandle<()>) {
    let (sender, receiver): (Sender<WorkerMessage>, Receiver<WorkerMessage>) = unbounded();
    let thread = thread::Builder::new()
        .name("disk-lru-cache-worker".to_string())
        .spawn(move || run(shared, receiver))
        .expect("failed to spawn disk-lru-cache background worker");
    (WorkerHandle { sender }, thread)
}

fn run(shared: Arc<Mutex<Shared>>, receiver: Receiver<WorkerMessage>) {
    for message in receiver.iter() {
        match message {
            WorkerMessage::Evict => {
                trace!("worker: running eviction pass");
                let mut guard = shared.lock();
                crate::cache::evict_locked(&mut guard);
            }
            WorkerMessage::Rebuild => {
                trace!("worker: checking rebuild threshold");
                let mut guard = shared.lock();
                crate::cache::maybe_rebuild_locked(&mut guard);
            }
            WorkerMessage::Flush(ack) => {
                let _ = ack.send(());
            }
            WorkerMessage::Shutdown(ack) => {
                debug!("worker: shutting down");
                let _ = ack.send(());
                break;
            }
        }
    }
}
