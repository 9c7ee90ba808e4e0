use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// Default coalescing interval, roughly one frame per display refresh.
pub const DEFAULT_COALESCE: Duration = Duration::from_millis(16);

struct CoalescerState {
    buffer: String,
    timer: Option<JoinHandle<()>>,
    stopped: bool,
}

/// Batches a firehose of terminal output into fixed-interval frames.
///
/// Each `push` appends to the buffer; the first push after an emission
/// schedules a single timer that drains the buffer when it fires. At most
/// one timer exists at any instant: `flush` and `stop` abort it while
/// holding the state lock, so a fired timer can never race an explicit
/// drain.
pub struct OutputCoalescer {
    state: Arc<Mutex<CoalescerState>>,
    interval: Duration,
    tx: mpsc::UnboundedSender<String>,
}

impl OutputCoalescer {
    /// Create a coalescer emitting on the given interval.
    ///
    /// Returns the coalescer and the receiver on which frames arrive.
    pub fn new(interval: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coalescer = Self {
            state: Arc::new(Mutex::new(CoalescerState {
                buffer: String::new(),
                timer: None,
                stopped: false,
            })),
            interval,
            tx,
        };
        (coalescer, rx)
    }

    /// Append a chunk and schedule an emission if none is in flight.
    ///
    /// After `stop`, chunks still accumulate but no timer is scheduled;
    /// only an explicit `flush` drains them.
    pub async fn push(&self, chunk: &str) {
        let mut state = self.state.lock().await;
        state.buffer.push_str(chunk);

        if state.timer.is_some() || state.stopped {
            return;
        }

        let state_arc = Arc::clone(&self.state);
        let tx = self.tx.clone();
        let interval = self.interval;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let mut state = state_arc.lock().await;
            state.timer = None;
            if !state.buffer.is_empty() {
                let frame = mem::take(&mut state.buffer);
                debug!(bytes = frame.len(), "Emitting coalesced frame");
                let _ = tx.send(frame);
            }
        }));
    }

    /// Cancel any scheduled emission and emit the buffer now if non-empty.
    pub async fn flush(&self) {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if !state.buffer.is_empty() {
            let frame = mem::take(&mut state.buffer);
            debug!(bytes = frame.len(), "Emitting flushed frame");
            let _ = self.tx.send(frame);
        }
    }

    /// Flush, then disable implicit scheduling for the remaining lifetime.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.stopped = true;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if !state.buffer.is_empty() {
            let frame = mem::take(&mut state.buffer);
            let _ = self.tx.send(frame);
        }
    }

    /// Bytes currently buffered and awaiting emission.
    pub async fn buffered_len(&self) -> usize {
        self.state.lock().await.buffer.len()
    }
}
