//! WebSocket relay between the detector and viewers

mod client;
pub mod protocol;
mod server;

pub use client::{RelayClient, RelayError, RelaySink};
pub use protocol::{ProtocolError, RelayMessage};
pub use server::RelayServer;
