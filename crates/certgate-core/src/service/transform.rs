//! Data transformation collaborator
//!
//! Maps between the platform's internal schema and each authority's wire
//! format. The gateway only depends on the trait.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::domain::{ApplicationData, DocumentsData};
use crate::error::{GatewayError, GatewayResult};

/// Inputs handed to [`DataTransformService::transform_for_submission`]
#[derive(Debug, Clone)]
pub struct SubmissionInputs<'a> {
    pub application: &'a ApplicationData,
    pub documents: &'a DocumentsData,
}

pub trait DataTransformService: Send + Sync {
    /// Build one payload per target authority
    fn transform_for_submission(
        &self,
        inputs: &SubmissionInputs<'_>,
        target_authorities: &[String],
    ) -> GatewayResult<BTreeMap<String, Value>>;

    /// Normalize a raw authority response into the internal schema
    fn transform_from_response(
        &self,
        raw: Value,
        authority: &str,
        operation: &str,
    ) -> GatewayResult<Value>;
}

/// Identity transform: responses pass through, submissions share one payload shape
#[derive(Debug, Clone, Default)]
pub struct PassthroughTransform;

impl DataTransformService for PassthroughTransform {
    fn transform_for_submission(
        &self,
        inputs: &SubmissionInputs<'_>,
        target_authorities: &[String],
    ) -> GatewayResult<BTreeMap<String, Value>> {
        let application = serde_json::to_value(inputs.application)
            .map_err(|e| GatewayError::Validation(format!("unserializable application: {}", e)))?;
        let documents = serde_json::to_value(&inputs.documents.documents)
            .map_err(|e| GatewayError::Validation(format!("unserializable documents: {}", e)))?;

        Ok(target_authorities
            .iter()
            .map(|authority| {
                let payload = json!({
                    "applicationId": inputs.application.application_id,
                    "application": application,
                    "documents": documents,
                });
                (authority.clone(), payload)
            })
            .collect())
    }

    fn transform_from_response(
        &self,
        raw: Value,
        _authority: &str,
        _operation: &str,
    ) -> GatewayResult<Value> {
        Ok(raw)
    }
}
