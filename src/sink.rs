//! Output sink abstraction plus a background-thread writer.
//!
//! `SinkWriter` pairs an `Arc<AtomicBool>` shutdown flag with a
//! `thread::spawn` worker draining a shared queue: the worker drains
//! [`Record`]s to a [`Sink`] off the hot path. The queue is a bounded
//! `Mutex<VecDeque<Record>>` rather than an `mpsc::sync_channel` so that
//! [`BackpressurePolicy::DropOldest`] can evict an already-queued record —
//! an `mpsc` sender has no way to reach back into the channel once a send
//! has succeeded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::warn;

use crate::config::BackpressurePolicy;
use crate::error::SinkError;
use crate::record::Record;

/// Anything that can durably consume decoded [`Record`]s: JSON-lines to a
/// file, a syslog forwarder, an MQTT publisher, …
pub trait Sink: Send {
    fn write(&mut self, record: &Record) -> Result<(), SinkError>;

    /// Drain any buffered output. Sinks that write through on every
    /// `write` (most of them) can rely on the default no-op; a sink that
    /// batches, like a buffered JSON-lines writer, should flush here so
    /// callers can force a drain at a source boundary (end of capture,
    /// file rotation) without waiting for the buffer to fill on its own.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

struct Shared {
    queue: Mutex<VecDeque<Record>>,
    not_empty: Condvar,
    shutdown: AtomicBool,
    lost_total: AtomicU64,
}

/// Runs a [`Sink`] on a dedicated thread, decoupling decode latency from
/// sink I/O latency. The queue is bounded at `queue_depth`; once full, the
/// configured [`BackpressurePolicy`] decides whether the oldest queued
/// record is evicted to make room for the new one, or the new one is
/// dropped instead — either way the running total is exposed via
/// [`SinkWriter::lost_total`] and `push` itself never blocks.
pub struct SinkWriter {
    shared: Arc<Shared>,
    policy: BackpressurePolicy,
    queue_depth: usize,
    handle: Option<JoinHandle<()>>,
}

impl SinkWriter {
    pub fn spawn(mut sink: Box<dyn Sink>, queue_depth: usize, policy: BackpressurePolicy) -> Self {
        let queue_depth = queue_depth.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(queue_depth)),
            not_empty: Condvar::new(),
            shutdown: AtomicBool::new(false),
            lost_total: AtomicU64::new(0),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || loop {
            let record = {
                let mut queue = thread_shared.queue.lock().unwrap();
                loop {
                    if let Some(record) = queue.pop_front() {
                        break Some(record);
                    }
                    if thread_shared.shutdown.load(Ordering::Relaxed) {
                        break None;
                    }
                    let (guard, _timeout) = thread_shared
                        .not_empty
                        .wait_timeout(queue, std::time::Duration::from_millis(200))
                        .unwrap();
                    queue = guard;
                }
            };
            match record {
                Some(record) => {
                    if let Err(e) = sink.write(&record) {
                        warn!(error = %e, "sink write failed");
                    }
                }
                None => {
                    if let Err(e) = sink.flush() {
                        warn!(error = %e, "sink flush failed");
                    }
                    break;
                }
            }
        });

        Self {
            shared,
            policy,
            queue_depth,
            handle: Some(handle),
        }
    }

    /// Enqueue a record for the writer thread. Never blocks: if the queue
    /// is already at `queue_depth`, the configured [`BackpressurePolicy`]
    /// decides which record is dropped — and it is always counted lost.
    pub fn push(&self, record: Record) {
        let mut queue = self.shared.queue.lock().unwrap();
        if queue.len() >= self.queue_depth {
            match self.policy {
                BackpressurePolicy::DropOldest => {
                    queue.pop_front();
                    queue.push_back(record);
                }
                BackpressurePolicy::DropNewest => {}
            }
            self.shared.lost_total.fetch_add(1, Ordering::Relaxed);
        } else {
            queue.push_back(record);
        }
        drop(queue);
        self.shared.not_empty.notify_one();
    }

    pub fn lost_total(&self) -> u64 {
        self.shared.lost_total.load(Ordering::Relaxed)
    }

    /// Signal the writer thread to stop after draining whatever is already
    /// queued, and join it.
    pub fn shutdown(mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        self.shared.not_empty.notify_one();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for SinkWriter {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        self.shared.not_empty.notify_one();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
