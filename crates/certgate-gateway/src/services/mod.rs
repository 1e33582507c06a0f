//! Gateway services
//!
//! - `gateway` - The high-level certification operations and their builder
//! - `metrics` - In-process metrics store

mod gateway;
mod metrics;

pub use gateway::{authorities, health_score, operations, CertificationGateway, GatewayBuilder};
pub use metrics::InMemoryMetricsStore;
