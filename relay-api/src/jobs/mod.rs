//! Background Jobs for the RELAY API
//!
//! - `handoff_expiry`: rejects pending handoffs that outlived their TTL
//!
//! # Usage
//!
//! ```ignore
//! use relay_api::jobs::{handoff_expiry_task, HandoffExpiryConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let coordinator = state.handoffs.clone();
//! tokio::spawn(handoff_expiry_task(coordinator, HandoffExpiryConfig::default(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod handoff_expiry;

pub use handoff_expiry::{
    handoff_expiry_task, run_sweep, HandoffExpiryConfig, HandoffExpiryMetrics,
    HandoffExpirySnapshot,
};
