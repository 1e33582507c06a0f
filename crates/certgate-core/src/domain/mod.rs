//! Domain entities for the gateway

mod audit;
mod authority;
mod config;
mod event;
mod health;
mod outcome;
mod report;
mod subject;

pub use audit::{AuditOutcome, AuditRecord};
pub use authority::{
    AuthDescriptor, AuthKind, AuthorityConfig, BackoffKind, CircuitDescriptor, HmacAlgorithm,
    HttpMethod, OperationSpec, RateLimitDescriptor, RetryPolicy, RetryableCode, Secret,
};
pub use config::{
    interpolate_env, render_path, GatewaySettings, HealthServerSettings, TokenRefreshSettings,
};
pub use event::GatewayEvent;
pub use health::{
    AuthStatus, AuthorityMetrics, CircuitSnapshot, CircuitStatus, EndpointHealth, OverallStatus,
    SystemHealth,
};
pub use outcome::{CallOutcome, OutcomeSummary};
pub use report::{
    AuthorityResult, FieldStatus, OperationResponse, ReportResult, ReportType, StatusEntry,
    StatusReport, SubmissionEntry, SubmissionReport, TrackingRef, VerificationReport,
};
pub use subject::{
    ApplicationData, DocumentRef, DocumentsData, IdentityData, IdentityVerificationOptions,
    LandData, OwnerData,
};
