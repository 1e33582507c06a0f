//! Audit collaborator

use async_trait::async_trait;

use crate::domain::AuditRecord;

/// Append-only audit sink. Failures are reported to the caller, which logs
/// them and carries on.
#[async_trait]
pub trait AuditService: Send + Sync {
    async fn create_record(&self, record: AuditRecord) -> anyhow::Result<()>;
}

/// Writes audit records to the `certgate::audit` tracing target
#[derive(Debug, Clone, Default)]
pub struct TracingAuditService;

#[async_trait]
impl AuditService for TracingAuditService {
    async fn create_record(&self, record: AuditRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(&record)?;
        tracing::info!(
            target: "certgate::audit",
            operation_id = %record.operation_id,
            action = %record.action,
            "{}",
            line
        );
        Ok(())
    }
}
