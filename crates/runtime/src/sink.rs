use concierge_core::StreamEvent;
use tokio::sync::mpsc;

/// Write side of an event channel. Unbounded, so emitting never waits on the
/// consumer.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the consumer is gone. Callers keep going either
    /// way; losing the consumer never interrupts a tool that is running.
    pub fn emit(&self, event: StreamEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
