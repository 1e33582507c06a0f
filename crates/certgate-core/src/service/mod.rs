//! Collaborator contracts consumed by the gateway

mod audit;
mod metrics;
mod transform;

pub use audit::{AuditService, TracingAuditService};
pub use metrics::{MetricsStore, RejectionKind};
pub use transform::{DataTransformService, PassthroughTransform, SubmissionInputs};
