// rust/stream-core/src/dataset/prefetch.rs

//! Background worker that pulls batches from the remote server.
//!
//! After the handshake the worker owns the channel. It keeps exactly one
//! `Data` request in flight, pushes each decoded batch onto the bounded
//! queue (blocking while it is full) and stops at end-of-stream, on the
//! first error, or when cancelled. Whatever the reason, it closes the queue
//! on the way out so the consumer never waits on a worker that is gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::queue::{BoundedBatchQueue, QueueClosed};
use super::traits::Batch;
use crate::codec::{Codec, Reply, Request};
use crate::error::{Result, StreamError};
use crate::transport::Channel;

/// Queue entry: a batch, or the error that stopped the worker.
pub type PrefetchItem = Result<Batch>;

/// The queue type shared by the worker and the record iterator.
pub type PrefetchQueue = BoundedBatchQueue<PrefetchItem>;

/// Why the worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The server signalled end-of-stream.
    EndOfStream,
    /// The owner cancelled the stream or closed the queue.
    Cancelled,
    /// A transport, decode or protocol error; the message of that error.
    Failed(String),
}

/// What the worker did before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    /// `Data` requests sent.
    pub requests: u64,
    /// Batches pushed onto the queue.
    pub batches: u64,
    pub outcome: WorkerOutcome,
}

/// Handle to the prefetch thread.
pub struct PrefetchWorker {
    /// Flag to signal the prefetch thread to stop.
    stop_flag: Arc<AtomicBool>,
    /// Queue shared with the consumer; closed on stop.
    queue: Arc<PrefetchQueue>,
    /// Handle to the prefetch thread.
    prefetch_thread: Option<JoinHandle<WorkerSummary>>,
    /// Summary kept after the thread has been joined.
    summary: Option<WorkerSummary>,
}

impl PrefetchWorker {
    /// Spawns the worker thread. The worker takes ownership of `channel`.
    pub fn spawn(
        channel: Box<dyn Channel>,
        codec: Arc<dyn Codec>,
        queue: Arc<PrefetchQueue>,
    ) -> Result<Self> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let peer = channel.peer().to_string();

        // Clone references for the background thread
        let queue_clone = queue.clone();
        let stop_flag_clone = stop_flag.clone();

        let prefetch_thread = thread::Builder::new()
            .name("stream-prefetch".to_string())
            .spawn(move || run_prefetch(channel, codec, &queue_clone, &stop_flag_clone))
            .map_err(|e| {
                StreamError::transport_with_source(peer, "failed to spawn prefetch thread", e)
            })?;

        Ok(Self {
            stop_flag,
            queue,
            prefetch_thread: Some(prefetch_thread),
            summary: None,
        })
    }

    /// Returns true once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.prefetch_thread
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Signals cancellation, unblocks the worker and waits for it to exit.
    ///
    /// A worker blocked in a network read only notices once the read
    /// returns or times out. Calling `stop` again returns the same summary.
    pub fn stop(&mut self) -> Result<WorkerSummary> {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.queue.close();
        self.join()
    }

    /// Waits for the worker to finish on its own.
    pub fn join(&mut self) -> Result<WorkerSummary> {
        if let Some(thread) = self.prefetch_thread.take() {
            let summary = thread.join().map_err(|_| StreamError::WorkerPanicked)?;
            self.summary = Some(summary);
        }
        self.summary.clone().ok_or(StreamError::WorkerPanicked)
    }
}

impl Drop for PrefetchWorker {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Sends one `Data` request and decodes its reply.
fn fetch_next(channel: &mut dyn Channel, codec: &dyn Codec) -> Result<Reply> {
    channel.send_request(Request::Data.as_bytes())?;
    let bytes = channel.receive_response()?;
    codec.decode_reply(bytes)
}

/// The worker loop. Always closes `queue` before returning.
pub(crate) fn run_prefetch(
    mut channel: Box<dyn Channel>,
    codec: Arc<dyn Codec>,
    queue: &PrefetchQueue,
    stop_flag: &AtomicBool,
) -> WorkerSummary {
    let mut requests = 0u64;
    let mut batches = 0u64;

    let outcome = loop {
        // Check if we should stop
        if stop_flag.load(Ordering::SeqCst) {
            break WorkerOutcome::Cancelled;
        }

        requests += 1;
        match fetch_next(channel.as_mut(), codec.as_ref()) {
            Ok(Reply::EndOfStream) => {
                tracing::info!(
                    peer = channel.peer(),
                    batches,
                    "dataset download finished"
                );
                break WorkerOutcome::EndOfStream;
            }
            Ok(Reply::Batch(batch)) => {
                tracing::debug!(
                    batch_index = batches,
                    rows = batch.num_rows(),
                    columns = batch.num_columns(),
                    "prefetched batch"
                );
                match queue.push(Ok(batch)) {
                    Ok(()) => batches += 1,
                    Err(QueueClosed(_)) => break WorkerOutcome::Cancelled,
                }
            }
            Err(e) => {
                if stop_flag.load(Ordering::SeqCst) {
                    break WorkerOutcome::Cancelled;
                }
                tracing::error!(peer = channel.peer(), error = %e, "prefetch worker failed");
                let message = e.to_string();
                // Hand the error to the consumer; dropped only if it already left.
                let _ = queue.push(Err(e));
                break WorkerOutcome::Failed(message);
            }
        }
    };

    queue.close();
    WorkerSummary {
        requests,
        batches,
        outcome,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::codec::{SentinelCodec, TaggedCodec, SENTINEL_LEN};

    /// Channel that answers from a fixed script and records every request.
    pub(crate) struct ScriptedChannel {
        replies: VecDeque<Result<Vec<u8>>>,
        requests: Arc<Mutex<Vec<Vec<u8>>>>,
        /// Reply used once the script runs out.
        fallback: Option<Vec<u8>>,
    }

    impl ScriptedChannel {
        pub(crate) fn new(replies: Vec<Vec<u8>>) -> Self {
            Self {
                replies: replies.into_iter().map(Ok).collect(),
                requests: Arc::new(Mutex::new(Vec::new())),
                fallback: None,
            }
        }

        pub(crate) fn with_error(mut self, error: StreamError) -> Self {
            self.replies.push_back(Err(error));
            self
        }

        /// Keep answering `reply` forever after the script is used up.
        pub(crate) fn repeating(mut self, reply: Vec<u8>) -> Self {
            self.fallback = Some(reply);
            self
        }

        pub(crate) fn request_log(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
            self.requests.clone()
        }
    }

    impl Channel for ScriptedChannel {
        fn send_request(&mut self, message: &[u8]) -> Result<()> {
            self.requests.lock().unwrap().push(message.to_vec());
            Ok(())
        }

        fn receive_response(&mut self) -> Result<Vec<u8>> {
            match self.replies.pop_front() {
                Some(reply) => reply,
                None => self
                    .fallback
                    .clone()
                    .ok_or_else(|| StreamError::transport("script", "script exhausted")),
            }
        }

        fn peer(&self) -> &str {
            "script"
        }
    }

    pub(crate) fn encoded_batches(codec: &dyn Codec, count: usize, rows: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|b| {
                let values: Vec<i64> = (0..rows).map(|r| (b * rows + r) as i64).collect();
                codec
                    .encode_batch(&Batch::new().with_column("id", values))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_stops_at_end_of_stream() {
        let codec: Arc<dyn Codec> = Arc::new(TaggedCodec::new());
        let mut replies = encoded_batches(codec.as_ref(), 3, 2);
        replies.push(codec.encode_end_of_stream());
        let channel = ScriptedChannel::new(replies);
        let log = channel.request_log();

        let queue = PrefetchQueue::new(8);
        let summary = run_prefetch(Box::new(channel), codec, &queue, &AtomicBool::new(false));

        assert_eq!(summary.outcome, WorkerOutcome::EndOfStream);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.requests, 4);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        assert!(log.iter().all(|r| r == b"Data"));

        assert_eq!(queue.len(), 3);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_stops_at_sentinel_end_of_stream() {
        let codec: Arc<dyn Codec> = Arc::new(SentinelCodec::new());
        let mut replies = encoded_batches(codec.as_ref(), 3, 2);
        let end = codec.encode_end_of_stream();
        assert_eq!(end.len(), SENTINEL_LEN);
        replies.push(end);
        // Anything after the sentinel must never be requested
        replies.extend(encoded_batches(codec.as_ref(), 2, 2));
        let channel = ScriptedChannel::new(replies);
        let log = channel.request_log();

        let queue = PrefetchQueue::new(8);
        let summary = run_prefetch(Box::new(channel), codec, &queue, &AtomicBool::new(false));

        assert_eq!(summary.outcome, WorkerOutcome::EndOfStream);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.requests, 4);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        assert!(log.iter().all(|r| r == b"Data"));

        assert_eq!(queue.len(), 3);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_batches_enqueued_in_receipt_order() {
        let codec: Arc<dyn Codec> = Arc::new(TaggedCodec::new());
        let mut replies = encoded_batches(codec.as_ref(), 4, 3);
        replies.push(codec.encode_end_of_stream());

        let queue = PrefetchQueue::new(8);
        run_prefetch(
            Box::new(ScriptedChannel::new(replies)),
            codec,
            &queue,
            &AtomicBool::new(false),
        );

        let mut firsts = Vec::new();
        while let Some(item) = queue.pop() {
            let batch = item.unwrap();
            firsts.push(batch.get("id", 0).unwrap().as_int().unwrap());
        }
        assert_eq!(firsts, vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_decode_failure_is_forwarded_once() {
        let codec: Arc<dyn Codec> = Arc::new(TaggedCodec::new());
        let mut replies = encoded_batches(codec.as_ref(), 1, 2);
        replies.push(vec![0x02, 0xff]);
        // Would be a valid batch, but the worker must not get this far.
        replies.extend(encoded_batches(codec.as_ref(), 1, 2));
        let channel = ScriptedChannel::new(replies);
        let log = channel.request_log();

        let queue = PrefetchQueue::new(8);
        let summary = run_prefetch(Box::new(channel), codec, &queue, &AtomicBool::new(false));

        assert!(matches!(summary.outcome, WorkerOutcome::Failed(_)));
        assert_eq!(summary.batches, 1);
        assert_eq!(log.lock().unwrap().len(), 2);

        assert!(queue.pop().unwrap().is_ok());
        let err = queue.pop().unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Decode { .. }));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_transport_failure_is_forwarded() {
        let codec: Arc<dyn Codec> = Arc::new(TaggedCodec::new());
        let channel = ScriptedChannel::new(vec![])
            .with_error(StreamError::transport("script", "connection reset"));

        let queue = PrefetchQueue::new(2);
        let summary = run_prefetch(Box::new(channel), codec, &queue, &AtomicBool::new(false));

        assert!(matches!(summary.outcome, WorkerOutcome::Failed(ref m) if m.contains("reset")));
        assert!(matches!(
            queue.pop(),
            Some(Err(StreamError::Transport { .. }))
        ));
    }

    #[test]
    fn test_cancelled_before_first_request() {
        let codec: Arc<dyn Codec> = Arc::new(TaggedCodec::new());
        let channel = ScriptedChannel::new(vec![]);
        let log = channel.request_log();

        let queue = PrefetchQueue::new(2);
        let summary = run_prefetch(Box::new(channel), codec, &queue, &AtomicBool::new(true));

        assert_eq!(summary.outcome, WorkerOutcome::Cancelled);
        assert_eq!(summary.requests, 0);
        assert!(log.lock().unwrap().is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_backpressure_and_stop_unblocks_worker() {
        let codec: Arc<dyn Codec> = Arc::new(TaggedCodec::new());
        // Endless supply of batches; only the queue bound holds the worker back.
        let batch = encoded_batches(codec.as_ref(), 1, 4).remove(0);
        let channel = ScriptedChannel::new(vec![]).repeating(batch);
        let log = channel.request_log();

        let queue = Arc::new(PrefetchQueue::new(2));
        let mut worker = PrefetchWorker::spawn(Box::new(channel), codec, queue.clone()).unwrap();

        // Let the worker fill the queue and block on the third push.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.len() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(50));

        assert_eq!(queue.len(), 2);
        assert!(!worker.is_finished());
        // Two queued, one held by the blocked push.
        assert_eq!(log.lock().unwrap().len(), 3);

        let summary = worker.stop().unwrap();
        assert_eq!(summary.outcome, WorkerOutcome::Cancelled);
        assert_eq!(summary.batches, 2);
        assert!(worker.is_finished());
        assert_eq!(worker.stop().unwrap(), summary);
    }
}
