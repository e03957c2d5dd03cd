use base64::Engine;
use serde::{Deserialize, Serialize};

/// An artifact attached to an `RquestResult` — a base64-encoded TSV blob in
/// this worker's case, always `type_ == "BCOS"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    #[serde(rename = "file_data")]
    pub data: String,
    #[serde(rename = "file_description")]
    pub description: String,
    #[serde(rename = "file_name")]
    pub name: String,
    #[serde(rename = "file_reference")]
    pub reference: String,
    #[serde(rename = "file_sensitive")]
    pub sensitive: bool,
    #[serde(rename = "file_size")]
    pub size: f64,
    #[serde(rename = "file_type")]
    pub type_: String,
}

impl File {
    /// Builds a `BCOS` file from raw TSV text: base64-encodes the payload
    /// and reports size in KB as bytes-of-base64/1000, matching the source.
    pub fn from_tsv(name: &str, tsv: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(tsv.as_bytes());
        let size = encoded.len() as f64 / 1000.0;
        Self {
            data: encoded,
            description: String::new(),
            name: name.to_string(),
            reference: String::new(),
            sensitive: false,
            size,
            type_: "BCOS".to_string(),
        }
    }

    /// Same packaging, skipping the base64 step (`--no-encode`).
    pub fn from_tsv_unencoded(name: &str, tsv: &str) -> Self {
        let size = tsv.len() as f64 / 1000.0;
        Self {
            data: tsv.to_string(),
            description: String::new(),
            name: name.to_string(),
            reference: String::new(),
            sensitive: false,
            size,
            type_: "BCOS".to_string(),
        }
    }
}
