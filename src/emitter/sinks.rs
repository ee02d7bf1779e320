//! In-process sinks

use tokio::sync::broadcast;
use tracing::info;

use super::{EventSink, SinkError};
use crate::events::{GestureEvent, GestureKind};

/// Calls a closure for every event
pub struct CallbackSink<F> {
    name: String,
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: FnMut(&GestureEvent) + Send,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<F> EventSink for CallbackSink<F>
where
    F: FnMut(&GestureEvent) + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, event: &GestureEvent) -> Result<(), SinkError> {
        (self.callback)(event);
        Ok(())
    }
}

/// Publishes events to in-process subscribers
pub struct BroadcastSink {
    tx: broadcast::Sender<GestureEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<GestureEvent>) -> Self {
        Self { tx }
    }

    /// Subscribe to events published through this sink
    pub fn subscribe(&self) -> broadcast::Receiver<GestureEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn deliver(&mut self, event: &GestureEvent) -> Result<(), SinkError> {
        self.tx
            .send(*event)
            .map(|_| ())
            .map_err(|_| SinkError::NoSubscribers)
    }
}

/// Logs every gesture at info level
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&mut self, event: &GestureEvent) -> Result<(), SinkError> {
        match event.kind {
            GestureKind::Eye => info!(amplitude = event.amplitude, "eyes blinked"),
            GestureKind::Jaw => info!(amplitude = event.amplitude, "jaw clenched"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_broadcast_without_subscribers_fails() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        let mut sink = BroadcastSink::new(tx);

        let event = GestureEvent::new(GestureKind::Eye, 500.0, Instant::now());
        assert!(matches!(sink.deliver(&event), Err(SinkError::NoSubscribers)));
    }

    #[test]
    fn test_broadcast_reaches_subscribers() {
        let (tx, _) = broadcast::channel(4);
        let mut sink = BroadcastSink::new(tx);
        let mut rx = sink.subscribe();

        let event = GestureEvent::new(GestureKind::Jaw, 700.0, Instant::now());
        tokio_test::assert_ok!(sink.deliver(&event));
        assert_eq!(rx.try_recv().unwrap().kind, GestureKind::Jaw);
    }

    #[test]
    fn test_log_sink_accepts() {
        let event = GestureEvent::new(GestureKind::Eye, 500.0, Instant::now());
        tokio_test::assert_ok!(LogSink.deliver(&event));
    }
}
