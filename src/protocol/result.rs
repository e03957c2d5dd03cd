use super::file::File;
use serde::{Deserialize, Serialize};

/// Top-level result returned to the coordinator for both availability and
/// distribution queries. `to_dict`'s exact wire shape is reproduced by
/// `Serialize` via field renames rather than a hand-built `json!` literal,
/// so every call site gets the same shape for free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RquestResult {
    pub uuid: String,
    pub status: String,
    pub collection_id: String,
    #[serde(default)]
    pub count: i64,
    #[serde(rename = "datasetCount", default)]
    pub datasets_count: i64,
    #[serde(default)]
    pub files: Vec<File>,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "protocolVersion", default = "default_protocol_version")]
    pub protocol_version: String,
}

fn default_protocol_version() -> String {
    "v2".to_string()
}

impl RquestResult {
    pub fn ok(uuid: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            status: "ok".to_string(),
            collection_id: collection_id.into(),
            count: 0,
            datasets_count: 0,
            files: Vec::new(),
            message: String::new(),
            protocol_version: default_protocol_version(),
        }
    }

    pub fn error(
        uuid: impl Into<String>,
        collection_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            status: "error".to_string(),
            collection_id: collection_id.into(),
            count: 0,
            datasets_count: 0,
            files: Vec::new(),
            message: message.into(),
            protocol_version: default_protocol_version(),
        }
    }

    /// Produces the exact wire shape the coordinator expects: a
    /// `queryResult` envelope nesting `count`/`datasetCount`/`files`.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "protocolVersion": self.protocol_version,
            "uuid": self.uuid,
            "queryResult": {
                "count": self.count,
                "datasetCount": self.datasets_count,
                "files": self.files,
            },
            "message": self.message,
            "collection_id": self.collection_id,
        })
    }
}
