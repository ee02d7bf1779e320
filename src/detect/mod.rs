//! Gesture detection: peak reduction, windowing and arbitration

pub mod arbitration;
mod pipeline;
pub mod reducer;
pub mod window;

pub use arbitration::{ArbitrationConfig, Thresholds};
pub use pipeline::{Pipeline, PipelineConfig, PipelineExit};
