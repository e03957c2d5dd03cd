use super::cohort::Cohort;
use serde::{Deserialize, Serialize};

/// Top-level availability query request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub cohort: Cohort,
    pub uuid: String,
    pub owner: String,
    pub collection: String,
    pub protocol_version: String,
    pub char_salt: String,
}

/// The kind of distribution a `DistributionQuery` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DistributionQueryType {
    Demographics,
    Generic,
    #[serde(rename = "ICD-MAIN")]
    IcdMain,
}

impl DistributionQueryType {
    pub fn file_name(&self) -> Option<&'static str> {
        match self {
            DistributionQueryType::Demographics => Some("demographics.distribution"),
            DistributionQueryType::Generic => Some("code.distribution"),
            DistributionQueryType::IcdMain => None,
        }
    }
}

/// Top-level distribution query request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionQuery {
    pub owner: String,
    pub code: DistributionQueryType,
    pub analysis: String,
    pub uuid: String,
    pub collection: String,
}
