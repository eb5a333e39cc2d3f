use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Types of proofs supported by the library
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofType {
    /// General Data Integrity Proof
    #[default]
    DataIntegrityProof,
}

impl fmt::Display for ProofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataIntegrityProof")
    }
}

/// Purposes for cryptographic proofs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProofPurpose {
    /// Authentication of entity identified by a DID
    Authentication,
    /// Assertion method for making verifiable claims
    AssertionMethod,
    /// Capability invocation
    CapabilityInvocation,
    /// Capability delegation
    CapabilityDelegation,
    /// Other purposes
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for ProofPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofPurpose::Authentication => f.write_str("authentication"),
            ProofPurpose::AssertionMethod => f.write_str("assertionMethod"),
            ProofPurpose::CapabilityInvocation => f.write_str("capabilityInvocation"),
            ProofPurpose::CapabilityDelegation => f.write_str("capabilityDelegation"),
            ProofPurpose::Other(s) => f.write_str(s),
        }
    }
}

/// A Data Integrity proof, as embedded under a document's `proof` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    /// JSON-LD context, copied from the secured document
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Optional identifier for the proof
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Type of proof
    #[serde(rename = "type")]
    pub proof_type: ProofType,

    /// Cryptographic suite name, kept as written so aliases hash as signed
    pub cryptosuite: String,

    /// When the proof was created (ISO8601 dateTime)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// When the proof expires (ISO8601 dateTime)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,

    /// Verification method that can be used to verify the proof
    pub verification_method: String,

    /// Purpose of the proof
    pub proof_purpose: ProofPurpose,

    /// Security domain for the proof
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Challenge to prevent replay attacks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,

    /// Random value to increase privacy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// ZCAP: Capability being invoked (for capabilityInvocation proof purpose)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,

    /// ZCAP: Action being performed with the capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_action: Option<String>,

    /// Multibase encoded signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_value: Option<String>,
}
