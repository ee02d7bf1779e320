//! Event emitter fanning gestures out to registered sinks
//!
//! Delivery is fire-and-forget: each sink gets at most one attempt per
//! event, and a failing sink never stops the others. A sink that panics is
//! removed so it cannot take the arbitration task down with it.

mod sinks;

use std::panic::{self, AssertUnwindSafe};

use futures_util::future::{self, BoxFuture};
use tracing::{debug, error, warn};

use crate::events::GestureEvent;

pub use sinks::{BroadcastSink, CallbackSink, LogSink};

/// Errors a sink can report for a single delivery
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink is not connected")]
    NotConnected,

    #[error("sink has no subscribers")]
    NoSubscribers,

    #[error("sink rejected the event: {0}")]
    Rejected(String),
}

/// Something that consumes fired gestures
pub trait EventSink: Send {
    /// Short label used in logs
    fn name(&self) -> &str;

    /// Deliver one event; failures are logged by the emitter and dropped
    fn deliver(&mut self, event: &GestureEvent) -> Result<(), SinkError>;

    /// Release held connections
    ///
    /// The returned future resolves once the sink has let go of them.
    fn close(&mut self) -> BoxFuture<'static, ()> {
        Box::pin(future::ready(()))
    }
}

/// Ordered set of sinks
#[derive(Default)]
pub struct Emitter {
    sinks: Vec<Box<dyn EventSink>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink, builder style
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.register(sink);
        self
    }

    /// Register a sink
    pub fn register(&mut self, sink: impl EventSink + 'static) {
        debug!(sink = sink.name(), "sink registered");
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver `event` to every sink, returning how many accepted it
    pub fn emit(&mut self, event: &GestureEvent) -> usize {
        let mut delivered = 0;

        self.sinks.retain_mut(|sink| {
            match panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(event))) {
                Ok(Ok(())) => {
                    delivered += 1;
                    true
                }
                Ok(Err(e)) => {
                    warn!(sink = sink.name(), kind = %event.kind, error = %e, "event dropped for sink");
                    true
                }
                Err(_) => {
                    error!(sink = sink.name(), kind = %event.kind, "sink panicked, removing it");
                    false
                }
            }
        });

        delivered
    }

    /// Close every sink and wait for all of them
    pub async fn close(&mut self) {
        let closing: Vec<_> = self.sinks.iter_mut().map(|sink| sink.close()).collect();
        future::join_all(closing).await;
        debug!(sinks = self.sinks.len(), "sinks closed");
    }
}
