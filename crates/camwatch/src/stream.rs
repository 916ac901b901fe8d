use tokio::sync::broadcast;

/// Buffered payloads per connected client before it starts losing messages
const STREAM_CAPACITY: usize = 16;

/// Best-effort fan-out of published payloads to directly connected clients.
///
/// Forwarding never waits: with no client attached the payload is skipped,
/// and clients that fall behind lose the oldest payloads.
#[derive(Debug, Clone)]
pub struct StreamSink {
    tx: broadcast::Sender<String>,
}

impl Default for StreamSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STREAM_CAPACITY);
        Self { tx }
    }

    /// Forward a payload; returns the number of clients it was queued for
    pub fn forward(&self, payload: &str) -> usize {
        if self.tx.receiver_count() == 0 {
            return 0;
        }
        self.tx.send(payload.to_string()).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}
