// rust/stream-core/src/dataset/queue.rs

//! Bounded FIFO between the prefetch worker and the record iterator.
//!
//! The queue is the only backpressure in the pipeline: `push` blocks while
//! `capacity` items are waiting, `pop` blocks while none are. Closing the
//! queue wakes both sides; items already queued can still be popped, and
//! `pop` reports closure only once the queue is drained.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Select, Sender};

/// Default queue capacity, in batches.
pub const DEFAULT_MAXSIZE: usize = 8;

/// Returned by `push` when the queue was closed; hands the item back.
#[derive(Debug, PartialEq, Eq)]
pub struct QueueClosed<T>(pub T);

impl<T> fmt::Display for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("push on a closed queue")
    }
}

/// Returned by `pop_timeout` when nothing arrived in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopTimeout;

pub struct BoundedBatchQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    /// Dropping this sender disconnects `close_rx`, which wakes every selector.
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
    closed: AtomicBool,
    capacity: usize,
}

impl<T> BoundedBatchQueue<T> {
    /// Creates a queue holding at most `maxsize` items (at least one).
    pub fn new(maxsize: usize) -> Self {
        let capacity = maxsize.max(1);
        let (sender, receiver) = channel::bounded(capacity);
        let (close_tx, close_rx) = channel::bounded(0);

        Self {
            sender,
            receiver,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    /// Enqueues `item`, blocking while the queue is full.
    pub fn push(&self, item: T) -> Result<(), QueueClosed<T>> {
        if self.is_closed() {
            return Err(QueueClosed(item));
        }

        let mut sel = Select::new();
        let send_index = sel.send(&self.sender);
        let close_index = sel.recv(&self.close_rx);
        let oper = sel.select();

        match oper.index() {
            i if i == send_index => oper
                .send(&self.sender, item)
                .map_err(|e| QueueClosed(e.into_inner())),
            i if i == close_index => {
                let _ = oper.recv(&self.close_rx);
                Err(QueueClosed(item))
            }
            _ => unreachable!("select returned an unregistered operation"),
        }
    }

    /// Dequeues the next item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut sel = Select::new();
        let recv_index = sel.recv(&self.receiver);
        let close_index = sel.recv(&self.close_rx);
        let oper = sel.select();

        match oper.index() {
            i if i == recv_index => oper.recv(&self.receiver).ok(),
            i if i == close_index => {
                let _ = oper.recv(&self.close_rx);
                self.receiver.try_recv().ok()
            }
            _ => unreachable!("select returned an unregistered operation"),
        }
    }

    /// Like `pop`, but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<T>, PopTimeout> {
        let deadline = Instant::now() + timeout;
        let mut sel = Select::new();
        let recv_index = sel.recv(&self.receiver);
        let close_index = sel.recv(&self.close_rx);
        let oper = sel.select_deadline(deadline).map_err(|_| PopTimeout)?;

        match oper.index() {
            i if i == recv_index => Ok(oper.recv(&self.receiver).ok()),
            i if i == close_index => {
                let _ = oper.recv(&self.close_rx);
                Ok(self.receiver.try_recv().ok())
            }
            _ => unreachable!("select returned an unregistered operation"),
        }
    }

    /// Marks the queue closed and wakes all blocked callers. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut guard = self
            .close_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for BoundedBatchQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAXSIZE)
    }
}

impl<T> fmt::Debug for BoundedBatchQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedBatchQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
