//! HoloLens telemetry ingestion server.
//!
//! Devices push readings over `POST /hololens/data` or the `/ws/hololens`
//! WebSocket. Readings land in a [`store::DeviceStore`] whose
//! [`store::StorePolicy`] decides between keeping the latest reading and the
//! full history. Named message types live in a [`registry::SchemaRegistry`]
//! and payloads are checked against them by [`validate::validate`], either by
//! clients before sending or by the server when ingest validation is enabled.

pub mod chunks;
pub mod config;
pub mod errors;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod rest;
pub mod store;
pub mod validate;
pub mod ws;

pub use config::Config;
pub use errors::{Error, Result};
pub use rest::{create_router, AppState};
