//! The single writer thread.
//!
//! Every put and delete is sent to one dedicated thread over an mpsc
//! queue and applied in submission order. The caller blocks on a
//! per-command completion channel until the write is appended, (optionally)
//! synced and indexed. Rotation happens on this thread, strictly before the
//! append that triggered it.
//!
//! A record becomes visible to readers only after its sync succeeds. A
//! failed sync leaves the bytes unindexed and reports the error, so a get
//! never returns a value that was not acknowledged.

use crate::engine::Shared;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexEntry;
use crate::segment::{Segment, SegmentRecord};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// A mutation waiting for the writer thread.
#[derive(Debug)]
pub(crate) enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

struct WriteCommand {
    op: WriteOp,
    done: SyncSender<CoreResult<()>>,
}

/// Handle to the writer thread.
pub(crate) struct Writer {
    queue: Mutex<Option<Sender<WriteCommand>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Writer {
    /// Spawns the writer thread for `shared`.
    pub(crate) fn spawn(shared: Arc<Shared>) -> CoreResult<Self> {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("bitlog-writer".to_string())
            .spawn(move || run(&shared, &rx))?;
        Ok(Self {
            queue: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queues `op` and blocks until the writer has applied it.
    ///
    /// Returns `EngineClosed` once [`Writer::stop`] has been called.
    pub(crate) fn submit(&self, op: WriteOp) -> CoreResult<()> {
        let queue = self.queue.lock().clone().ok_or(CoreError::EngineClosed)?;
        let (done, completion) = mpsc::sync_channel(1);
        queue
            .send(WriteCommand { op, done })
            .map_err(|_| CoreError::EngineClosed)?;
        completion.recv().map_err(|_| CoreError::EngineClosed)?
    }

    /// Closes the queue and waits for every queued command to finish.
    pub(crate) fn stop(&self) {
        drop(self.queue.lock().take());
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!("writer thread panicked");
            }
        }
    }
}

fn run(shared: &Shared, queue: &Receiver<WriteCommand>) {
    debug!("writer thread started");
    for command in queue {
        let result = apply(shared, command.op);
        if result.is_err() {
            shared.stats.record_error();
        }
        // The submitter may have gone away; nothing to report to.
        let _ = command.done.send(result);
    }
    debug!("writer thread stopped");
}

fn apply(shared: &Shared, op: WriteOp) -> CoreResult<()> {
    let record = match op {
        WriteOp::Put { key, value } => SegmentRecord::put(key, value),
        WriteOp::Delete { key } => SegmentRecord::tombstone(key),
    };
    let bytes = record.encode()?;
    let len = bytes.len() as u64;
    let tombstone = record.is_tombstone();

    let mut active = shared.active()?;
    let size = active.size()?;
    if active.is_sealed() || (size > 0 && size + len > shared.config.max_segment_size) {
        active = rotate(shared)?;
    }

    let offset = active.append(&bytes)?;
    if shared.config.sync_on_write {
        active.sync()?;
    }

    {
        let mut index = shared.index.write();
        if tombstone {
            index.remove(&record.key);
        } else {
            index.insert(record.key, IndexEntry::new(active.id(), offset, len));
        }
    }

    if tombstone {
        shared.stats.record_delete(len);
    } else {
        shared.stats.record_write(len);
    }
    Ok(())
}

/// Seals the active segment and installs a fresh one.
///
/// A previous rotation may have sealed the active segment and then failed
/// to create the next one; sealing is skipped in that case.
fn rotate(shared: &Shared) -> CoreResult<Arc<Segment>> {
    let mut guard = shared.segments.write();
    let segments = guard.as_mut().ok_or(CoreError::EngineClosed)?;
    let old = Arc::clone(&segments.active);
    let sealed = old.id();
    if !old.is_sealed() {
        old.seal(&shared.dir.sealed_path(sealed))?;
    }

    let next = sealed.next_active();
    let fresh = Arc::new(Segment::open_active(next, &shared.dir.active_path(next))?);
    shared.dir.sync()?;

    segments.sealed.insert(sealed, old);
    segments.active = Arc::clone(&fresh);
    drop(guard);

    shared.stats.record_rotation();
    info!(sealed = %sealed, active = %next, "rotated active segment");
    Ok(fresh)
}
