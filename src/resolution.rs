//! Inputs and outputs of DID resolution.

use crate::canonical_hash::Sha256Hash;
use crate::document::Document;
use crate::identifier::Network;
use bitcoin::Txid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::{fs, path::Path};

/// Options a caller passes to [`resolve`](crate::blockchain::resolve).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOptions {
    /// Stop once this version of the document is reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<u64>,

    /// Only consider blocks mined at or before this time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_time: Option<DateTime<Utc>>,

    /// Data necessary for resolving a DID such as DID Update Payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_data: Option<SidecarData>,

    /// The bitcoin network used for resolution. Must match the identifier when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,

    /// Only consider blocks with at least this many confirmations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_confirmations: Option<u32>,

    /// Scan up to and including this height
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u32>,
}

impl ResolutionOptions {
    /// Load options from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, serde_json::Error> {
        let content = fs::read_to_string(path).map_err(serde_json::Error::io)?;
        serde_json::from_str(&content)
    }
}

/// Off-chain data accompanying a resolution request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarData {
    /// The DID this data belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,

    /// Initial document of an external identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_document: Option<Value>,

    /// Update payloads keyed by the txid of the signal announcing them
    #[serde(default)]
    pub signals_metadata: HashMap<Txid, SignalMetadata>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMetadata {
    pub update_payload: Value,
}

/// Why a resolution stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionStatus {
    /// The requested version, or the target height, was reached
    TargetReached,
    /// The document was deactivated
    Deactivated,
    /// The chain ended before the requested version was found
    ChainTip,
    /// The caller cancelled, or the deadline passed
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub version_id: u64,
    pub deactivated: bool,
    /// targetHash of every applied update, in order
    pub update_hash_history: Vec<Sha256Hash>,
    /// Last block scanned, if any
    pub block_height: Option<u32>,
    pub target_block_height: u32,
    pub status: ResolutionStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub did_document: Document,
    pub did_document_metadata: DocumentMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_deserialize() {
        let options: ResolutionOptions = serde_json::from_value(json!({
            "versionTime": "2025-03-01T12:00:00Z",
            "network": "regtest",
            "requiredConfirmations": 6,
            "sidecarData": {
                "did": "did:btc1:k1example",
                "signalsMetadata": {
                    "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b": {
                        "updatePayload": {"targetVersionId": 2}
                    }
                }
            }
        }))
        .unwrap();

        assert_eq!(options.network, Some(Network::Regtest));
        assert_eq!(options.required_confirmations, Some(6));
        assert_eq!(options.version_time.unwrap().to_rfc3339(), "2025-03-01T12:00:00+00:00");

        let sidecar = options.sidecar_data.unwrap();
        let txid: Txid = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
            .parse()
            .unwrap();
        assert_eq!(
            sidecar.signals_metadata[&txid].update_payload["targetVersionId"],
            2
        );
    }

    #[test]
    fn test_options_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, r#"{"versionId": 3, "blockHeight": 100}"#).unwrap();

        let options = ResolutionOptions::from_file(&path).unwrap();
        assert_eq!(options.version_id, Some(3));
        assert_eq!(options.block_height, Some(100));
        assert!(options.sidecar_data.is_none());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(ResolutionStatus::ChainTip).unwrap(),
            json!("chainTip")
        );
    }
}
