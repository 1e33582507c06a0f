//! Certgate Gateway
//!
//! Resilient integration layer in front of the external certification
//! authorities. It provides:
//! - Per-authority credentials (API key, OAuth2, JWT assertion, HMAC, mutual TLS)
//! - Fixed-window rate limiting and circuit breaking per authority
//! - Retries with linear or exponential backoff
//! - Concurrent fan-out with settle-all aggregation
//! - The high-level certification operations and a health surface

pub mod aggregate;
pub mod auth;
pub mod dispatch;
pub mod logging;
pub mod registry;
pub mod resilience;
pub mod server;
pub mod services;

pub use aggregate::{Aggregator, Branch, VerificationCheck};
pub use auth::{AuthMaterial, AuthProvider, AuthStrategy, SigningContext, TlsIdentity};
pub use dispatch::{AuthorityTransport, Dispatcher, HttpTransport, OutboundRequest, RawResponse};
pub use registry::{EndpointRegistry, ResolvedEndpoint};
pub use resilience::{CircuitBreaker, RateLimiter};
pub use server::{health_router, HealthServer};
pub use services::{
    authorities, operations, CertificationGateway, GatewayBuilder, InMemoryMetricsStore,
};
