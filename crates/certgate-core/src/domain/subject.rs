//! Caller-supplied inputs for the high-level operations
//!
//! Every input validates itself before any network call is made.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{GatewayError, GatewayResult};

fn require(field: &str, value: &str) -> GatewayResult<()> {
    if value.trim().is_empty() {
        return Err(GatewayError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn validate_citizen_id(value: &str) -> GatewayResult<()> {
    if value.len() != 13 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GatewayError::Validation(
            "citizen_id must be exactly 13 digits".to_string(),
        ));
    }
    Ok(())
}

/// Applicant identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityData {
    pub citizen_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
}

impl IdentityData {
    pub fn new(
        citizen_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            citizen_id: citizen_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth: None,
        }
    }

    pub fn validate(&self) -> GatewayResult<()> {
        validate_citizen_id(&self.citizen_id)?;
        require("first_name", &self.first_name)?;
        require("last_name", &self.last_name)
    }

    /// Request body sent to identity authorities
    pub fn to_body(&self) -> Value {
        json!({
            "citizenId": self.citizen_id,
            "firstName": self.first_name,
            "lastName": self.last_name,
            "dateOfBirth": self.date_of_birth,
        })
    }
}

/// Options for identity verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityVerificationOptions {
    /// Also consult the digital-identity service
    #[serde(default = "default_true")]
    pub include_digital_identity: bool,
}

fn default_true() -> bool {
    true
}

impl Default for IdentityVerificationOptions {
    fn default() -> Self {
        Self {
            include_digital_identity: true,
        }
    }
}

/// Land parcel being claimed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandData {
    pub deed_number: String,
    pub province: String,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub area_rai: Option<f64>,
}

impl LandData {
    pub fn validate(&self) -> GatewayResult<()> {
        require("deed_number", &self.deed_number)?;
        require("province", &self.province)?;
        if let Some(area) = self.area_rai {
            if !area.is_finite() || area <= 0.0 {
                return Err(GatewayError::Validation(
                    "area_rai must be a positive number".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Claimed owner of a land parcel
pub type OwnerData = IdentityData;

/// Reference to a supporting document held by document storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub document_id: String,
    pub kind: String,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Documents accompanying a submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentsData {
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
}

impl DocumentsData {
    pub fn validate(&self) -> GatewayResult<()> {
        for doc in &self.documents {
            require("document_id", &doc.document_id)?;
            require("kind", &doc.kind)?;
        }
        Ok(())
    }
}

/// Certification application to be submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationData {
    pub application_id: String,
    pub certification_type: String,
    pub applicant: IdentityData,
    pub target_authorities: Vec<String>,
    #[serde(default)]
    pub details: Value,
}

impl ApplicationData {
    pub fn validate(&self) -> GatewayResult<()> {
        require("application_id", &self.application_id)?;
        require("certification_type", &self.certification_type)?;
        self.applicant.validate()?;
        if self.target_authorities.is_empty() {
            return Err(GatewayError::Validation(
                "at least one target authority is required".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for target in &self.target_authorities {
            if !seen.insert(target.as_str()) {
                return Err(GatewayError::Validation(format!(
                    "target authority '{}' listed twice",
                    target
                )));
            }
        }
        Ok(())
    }
}
