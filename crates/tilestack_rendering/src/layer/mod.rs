//! Per-layer batch management.

mod manager;

pub use manager::{BatchDrawRecord, LayerBatchManager};
