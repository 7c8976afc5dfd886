//! Order-preserving output channel between a sequencer and its readers.
//!
//! The queue keeps a FIFO buffer of finished segments and a wait-list of
//! suspended reads. A push either completes the oldest pending read or is
//! buffered; a read either pops the buffer or suspends on a oneshot until
//! a push arrives. Segments are therefore delivered in push order no
//! matter how many reads are pending.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, Stream};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use tkn_types::{HistoryStrategy, Segment, TknError};

use crate::history::{self, QueueHistory};

struct QueueState {
    buffer: VecDeque<Segment>,
    /// Leading buffer entries handed back by cancelled reads. They were
    /// recorded when first delivered.
    returned: usize,
    waiters: VecDeque<oneshot::Sender<Segment>>,
    history: Option<Box<dyn QueueHistory>>,
    closed: bool,
}

impl QueueState {
    fn record(&mut self, segment: &Segment) {
        if let Some(history) = self.history.as_mut() {
            history.push(segment.clone());
        }
    }

    /// Hand a segment to the oldest live waiter, or buffer it.
    ///
    /// A handed-off segment is recorded here, under the lock, so history
    /// follows delivery order. `returned` marks a segment given back by a
    /// cancelled read: it is already recorded and goes ahead of everything
    /// else in the buffer.
    fn deliver(&mut self, mut segment: Segment, returned: bool) {
        while let Some(waiter) = self.waiters.pop_front() {
            let copy = (!returned && self.history.is_some()).then(|| segment.clone());
            match waiter.send(segment) {
                Ok(()) => {
                    if let Some(copy) = copy {
                        self.record(&copy);
                    }
                    return;
                }
                // Reader went away; try the next one.
                Err(back) => segment = back,
            }
        }
        if returned {
            self.buffer.push_front(segment);
            self.returned += 1;
        } else {
            self.buffer.push_back(segment);
        }
    }

    /// Pop the buffer head, recording it unless it was recorded before.
    fn drain_one(&mut self) -> Option<Segment> {
        let segment = self.buffer.pop_front()?;
        if self.returned > 0 {
            self.returned -= 1;
        } else {
            self.record(&segment);
        }
        Some(segment)
    }
}

/// Shared handle to a segment queue. Clones refer to the same queue.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<Mutex<QueueState>>,
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Queue")
            .field("buffered", &state.buffer.len())
            .field("waiting", &state.waiters.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl Queue {
    /// Create a queue without history.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a queue that records delivered segments.
    pub fn with_history(history: Box<dyn QueueHistory>) -> Self {
        Self::build(Some(history))
    }

    /// Create a queue with the history selected by a strategy.
    pub fn from_strategy(strategy: HistoryStrategy) -> Result<Self, TknError> {
        Ok(Self::build(history::from_strategy(strategy)?))
    }

    fn build(history: Option<Box<dyn QueueHistory>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueState {
                buffer: VecDeque::new(),
                returned: 0,
                waiters: VecDeque::new(),
                history,
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock cannot leave the state half-updated.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Push a finished segment.
    ///
    /// Returns false, without queueing, if the queue has been closed.
    pub fn push(&self, segment: Segment) -> bool {
        let mut state = self.lock();
        if state.closed {
            warn!(key = %segment.key, "Push to closed queue rejected");
            return false;
        }
        trace!(key = %segment.key, waiting = state.waiters.len(), "Queue push");
        state.deliver(segment, false);
        true
    }

    /// Receive the next segment, suspending while the buffer is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn next_segment(&self) -> Option<Segment> {
        let rx = {
            let mut state = self.lock();
            if let Some(segment) = state.drain_one() {
                return Some(segment);
            }
            if state.closed {
                return None;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        let mut pending = PendingRead {
            rx: Some(rx),
            queue: self.clone(),
        };
        let received = match pending.rx.as_mut() {
            Some(rx) => rx.await.ok(),
            None => None,
        };
        pending.rx = None;
        received
    }

    /// Lazy stream of segments in push order.
    ///
    /// Every call returns a new stream over the same underlying queue, so
    /// two concurrent streams split the segments between them. The stream
    /// ends after `close()` once the buffer is drained.
    pub fn read(&self) -> impl Stream<Item = Segment> + Send + 'static {
        stream::unfold(self.clone(), |queue| async move {
            let segment = queue.next_segment().await?;
            Some((segment, queue))
        })
    }

    /// Stop accepting pushes and wake every suspended reader.
    ///
    /// Buffered segments remain readable.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let woken = state.waiters.len();
        state.waiters.clear();
        debug!(buffered = state.buffer.len(), woken, "Queue closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of buffered, undelivered segments.
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of reads currently suspended.
    pub fn waiting_readers(&self) -> usize {
        self.lock().waiters.iter().filter(|w| !w.is_closed()).count()
    }

    /// Delivered segments retained by the history, oldest first.
    ///
    /// Empty when the queue has no history.
    pub fn history(&self) -> Vec<Segment> {
        self.lock()
            .history
            .as_ref()
            .map(|h| h.get())
            .unwrap_or_default()
    }

    /// Drop the retained history, if any.
    pub fn clear_history(&self) {
        if let Some(history) = self.lock().history.as_mut() {
            history.clear();
        }
    }
}

/// A suspended read. If dropped after a segment was sent to it but before
/// it was observed, the segment goes back to the head of the queue.
struct PendingRead {
    rx: Option<oneshot::Receiver<Segment>>,
    queue: Queue,
}

impl Drop for PendingRead {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if let Ok(segment) = rx.try_recv() {
                debug!(key = %segment.key, "Returning segment from cancelled read");
                self.queue.lock().deliver(segment, true);
            }
        }
    }
}
