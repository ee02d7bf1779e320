//! braingame: EEG gesture detection for hands-free game input
//!
//! Detects eye blinks and jaw clenches in Muse EEG readings and relays them
//! to game clients over WebSocket.
//!
//! # Architecture
//!
//! ```text
//! SampleSource ─▶ reducer ─▶ window (eye) ─┐
//!                        └─▶ window (jaw) ─┴─▶ arbitration ─▶ Emitter ─▶ sinks
//!                                                                          │
//!                                        viz ◀── RelayServer ◀── RelaySink ┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use braingame_daemon::detect::{Pipeline, PipelineConfig};
//! use braingame_daemon::emitter::{CallbackSink, Emitter};
//! use braingame_daemon::events::GestureEvent;
//! use braingame_daemon::source::{SyntheticConfig, SyntheticSource};
//!
//! # async fn run() -> Result<(), braingame_daemon::source::SourceError> {
//! let source = SyntheticSource::new(SyntheticConfig::default());
//! let emitter = Emitter::new().with_sink(CallbackSink::new("print", |event: &GestureEvent| {
//!     println!("{event}");
//! }));
//!
//! let mut pipeline = Pipeline::start(Box::new(source), emitter, PipelineConfig::default())?;
//! pipeline.wait().await;
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod detect;
pub mod emitter;
pub mod events;
pub mod lifecycle;
pub mod relay;
pub mod source;
pub mod viz;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
