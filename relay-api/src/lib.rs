//! RELAY API - REST Layer
//!
//! Exposes the task store and handoff coordinator over HTTP (Axum), with
//! Prometheus metrics, structured logging, an OpenAPI document, and a
//! background job that expires stale handoffs.
//!
//! Handlers call the synchronous services directly; every service call is a
//! short critical section over in-process storage.

pub mod config;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::{ApiConfig, LogFormat};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::{ApiCoordinator, ApiTaskStore, AppState};
pub use types::*;
