//! BIP340 Data Integrity cryptosuites
//!
//! `bip340-jcs-2025` canonicalizes with JCS and `bip340-rdfc-2025` with RDFC-1.0. The older
//! `schnorr-secp256k1-jcs-2025` and `schnorr-secp256k1-rdfc-2025` names are accepted as aliases
//! and are preserved verbatim in proofs that use them.

use crate::canonical_hash::Sha256Hash;
use crate::canonicalization::{self, Canonicalization};
use crate::key::{self, Multikey};
use crate::zcap::proof::{Proof, ProofPurpose, ProofType};
use chrono::{DateTime, Utc};
use onlyerror::Error;
use secp256k1::schnorr::Signature;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};
use tracing::debug;

mod utils;

use utils::{multibase_decode, multibase_encode};

#[derive(Error, Debug)]
pub enum Error {
    /// Document root must be a JSON object
    DocumentNotObject,

    /// Document does not contain a proof
    MissingProof,

    /// Proof object is malformed
    MalformedProof(#[from] serde_json::Error),

    /// Unsupported cryptosuite
    #[error("Unsupported cryptosuite `{0}`")]
    UnsupportedCryptosuite(String),

    /// Invalid proofValue encoding
    InvalidProofValue,

    /// Canonicalization failed
    Canonicalization(#[from] canonicalization::Error),

    /// Error with key operations
    Key(#[from] key::Error),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Cryptosuite {
    #[default]
    Bip340Jcs2025,
    Bip340Rdfc2025,
}

impl Cryptosuite {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bip340Jcs2025 => "bip340-jcs-2025",
            Self::Bip340Rdfc2025 => "bip340-rdfc-2025",
        }
    }

    pub const fn alias(&self) -> &'static str {
        match self {
            Self::Bip340Jcs2025 => "schnorr-secp256k1-jcs-2025",
            Self::Bip340Rdfc2025 => "schnorr-secp256k1-rdfc-2025",
        }
    }

    pub const fn canonicalization(&self) -> Canonicalization {
        match self {
            Self::Bip340Jcs2025 => Canonicalization::Jcs,
            Self::Bip340Rdfc2025 => Canonicalization::Rdfc,
        }
    }

    // BIP-340 Data Integrity cryptosuite, section 3.3.3
    fn transform(&self, unsecured_document: &Value) -> Result<String, Error> {
        Ok(canonicalization::canonicalize(
            unsecured_document,
            self.canonicalization(),
        )?)
    }

    // BIP-340 Data Integrity cryptosuite, section 3.3.4
    fn hash(&self, transformed_data: &str, proof_config: &str) -> Sha256Hash {
        let mut hasher = Sha256::new();

        // Hash and concatenate proof config and transformed data
        hasher.update(Sha256::digest(proof_config));
        hasher.update(Sha256::digest(transformed_data));

        Sha256Hash(hasher.finalize().into())
    }

    // BIP-340 Data Integrity cryptosuite, section 3.3.5
    fn configure_proof(&self, proof_config: &Value) -> Result<String, Error> {
        Ok(canonicalization::canonicalize(
            proof_config,
            self.canonicalization(),
        )?)
    }

    // BIP-340 Data Integrity cryptosuite, section 3.3.6
    fn serialize_proof(&self, hash_data: Sha256Hash, multikey: &Multikey) -> Result<Signature, Error> {
        Ok(multikey.sign(hash_data.0)?)
    }

    // BIP-340 Data Integrity cryptosuite, section 3.3.7
    fn proof_verify(&self, hash_data: Sha256Hash, signature: &Signature, multikey: &Multikey) -> bool {
        multikey.verify(hash_data.0, signature)
    }
}

impl FromStr for Cryptosuite {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        [Self::Bip340Jcs2025, Self::Bip340Rdfc2025]
            .into_iter()
            .find(|suite| suite.name() == name || suite.alias() == name)
            .ok_or_else(|| Error::UnsupportedCryptosuite(name.to_string()))
    }
}

impl fmt::Display for Cryptosuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options used to create a proof. Everything here ends up in the signed proof configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofOptions {
    cryptosuite: Cryptosuite,
    cryptosuite_name: String,
    pub verification_method: String,
    pub proof_purpose: ProofPurpose,
    pub created: Option<DateTime<Utc>>,
    pub domain: Option<String>,
    pub challenge: Option<String>,
    pub capability: Option<String>,
    pub capability_action: Option<String>,
}

impl ProofOptions {
    pub fn new(
        cryptosuite: Cryptosuite,
        verification_method: impl Into<String>,
        proof_purpose: ProofPurpose,
    ) -> Self {
        Self {
            cryptosuite,
            cryptosuite_name: cryptosuite.name().to_string(),
            verification_method: verification_method.into(),
            proof_purpose,
            created: None,
            domain: None,
            challenge: None,
            capability: None,
            capability_action: None,
        }
    }

    /// Write `name` (which may be an alias) into the proof instead of the primary suite name.
    pub fn with_cryptosuite_name(mut self, name: &str) -> Result<Self, Error> {
        self.cryptosuite = name.parse()?;
        self.cryptosuite_name = name.to_string();
        Ok(self)
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.challenge = Some(challenge.into());
        self
    }

    pub fn with_capability(
        mut self,
        capability: impl Into<String>,
        capability_action: impl Into<String>,
    ) -> Self {
        self.capability = Some(capability.into());
        self.capability_action = Some(capability_action.into());
        self
    }

    pub fn cryptosuite(&self) -> Cryptosuite {
        self.cryptosuite
    }

    fn to_proof(&self, context: Option<Value>) -> Proof {
        Proof {
            context,
            id: None,
            proof_type: ProofType::DataIntegrityProof,
            cryptosuite: self.cryptosuite_name.clone(),
            created: self.created,
            expires: None,
            verification_method: self.verification_method.clone(),
            proof_purpose: self.proof_purpose.clone(),
            domain: self.domain.clone(),
            challenge: self.challenge.clone(),
            nonce: None,
            capability: self.capability.clone(),
            capability_action: self.capability_action.clone(),
            proof_value: None,
        }
    }
}

/// Expectations checked against a proof before its signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyOptions {
    pub expected_proof_purpose: ProofPurpose,
    pub expected_domain: Option<String>,
    pub expected_challenge: Option<String>,
}

impl VerifyOptions {
    pub fn new(expected_proof_purpose: ProofPurpose) -> Self {
        Self {
            expected_proof_purpose,
            expected_domain: None,
            expected_challenge: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub verified: bool,
    /// The document without its proof, present only when verified.
    pub verified_document: Option<Value>,
}

impl VerificationResult {
    fn failed() -> Self {
        Self {
            verified: false,
            verified_document: None,
        }
    }
}

// BIP-340 Data Integrity cryptosuite, section 3.3.1
/// Sign `document` and return a copy with the proof attached under `proof`.
pub fn add_proof(
    document: &Value,
    options: &ProofOptions,
    multikey: &Multikey,
) -> Result<Value, Error> {
    let mut unsecured_document = document.clone();
    unsecured_document
        .as_object_mut()
        .ok_or(Error::DocumentNotObject)?
        .remove("proof");

    // Add document context to proof if present
    let context = document.get("@context").cloned();
    let mut proof = options.to_proof(context);

    let suite = options.cryptosuite;
    let proof_config = suite.configure_proof(&serde_json::to_value(&proof)?)?;
    let transformed_data = suite.transform(&unsecured_document)?;
    let hash_data = suite.hash(&transformed_data, &proof_config);
    let proof_bytes = suite.serialize_proof(hash_data, multikey)?;

    proof.proof_value = Some(multibase_encode(&proof_bytes));

    let mut secured_document = unsecured_document;
    if let Some(object) = secured_document.as_object_mut() {
        object.insert("proof".to_string(), serde_json::to_value(&proof)?);
    }

    Ok(secured_document)
}

// This is defined by https://www.w3.org/TR/vc-data-integrity/#verify-proof
/// Verify the proof attached to `secured_document` against `multikey`.
///
/// Mismatched expectations and bad signatures are reported as `verified: false`. Only documents
/// that cannot be processed at all produce an error.
pub fn verify_proof(
    secured_document: &Value,
    options: &VerifyOptions,
    multikey: &Multikey,
) -> Result<VerificationResult, Error> {
    let object = secured_document
        .as_object()
        .ok_or(Error::DocumentNotObject)?;
    let proof_json = object.get("proof").ok_or(Error::MissingProof)?;
    let proof: Proof = serde_json::from_value(proof_json.clone())?;
    let suite: Cryptosuite = proof.cryptosuite.parse()?;

    let mut unsecured_document = secured_document.clone();
    if let Some(object) = unsecured_document.as_object_mut() {
        object.remove("proof");
    }

    // Step 5
    if proof.proof_purpose != options.expected_proof_purpose {
        debug!(
            purpose = %proof.proof_purpose,
            expected = %options.expected_proof_purpose,
            "proof purpose mismatch"
        );
        return Ok(VerificationResult::failed());
    }

    if let Some(expected_domain) = options.expected_domain.as_ref() {
        if proof.domain.as_ref() != Some(expected_domain) {
            debug!(domain = ?proof.domain, "proof domain mismatch");
            return Ok(VerificationResult::failed());
        }
    }

    if let Some(expected_challenge) = options.expected_challenge.as_ref() {
        if proof.challenge.as_ref() != Some(expected_challenge) {
            debug!(challenge = ?proof.challenge, "proof challenge mismatch");
            return Ok(VerificationResult::failed());
        }
    }

    if let Some(proof_context) = proof.context.as_ref() {
        if !context_matches(proof_context, unsecured_document.get("@context")) {
            debug!("proof context does not match document context");
            return Ok(VerificationResult::failed());
        }
    }

    let proof_value = proof.proof_value.as_deref().ok_or(Error::InvalidProofValue)?;
    let proof_bytes = multibase_decode(proof_value)?;

    // The proof configuration is the proof as written, minus its value.
    let mut proof_options = proof_json.clone();
    if let Some(object) = proof_options.as_object_mut() {
        object.remove("proofValue");
    }

    let proof_config = suite.configure_proof(&proof_options)?;
    let transformed_data = suite.transform(&unsecured_document)?;
    let hash_data = suite.hash(&transformed_data, &proof_config);

    let verified = suite.proof_verify(hash_data, &proof_bytes, multikey);
    if !verified {
        debug!(verification_method = %proof.verification_method, "signature did not verify");
    }

    Ok(VerificationResult {
        verified,
        verified_document: verified.then_some(unsecured_document),
    })
}

/// The document `@context` must begin with every entry of the proof `@context`, in order.
fn context_matches(proof_context: &Value, document_context: Option<&Value>) -> bool {
    let Some(document_context) = document_context else {
        return false;
    };

    match (proof_context, document_context) {
        (Value::Array(proof_entries), Value::Array(document_entries)) => {
            document_entries.starts_with(proof_entries)
        }
        (proof_context, document_context) => proof_context == document_context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SecretKey;
    use serde_json::json;

    fn multikey() -> Multikey {
        let secret = SecretKey::from_slice(&[0x11; 32]).unwrap();
        Multikey::from_secret_key("did:btc1:k1test#initialKey", "did:btc1:k1test", secret)
    }

    fn document() -> Value {
        json!({
            "@context": ["https://w3id.org/zcap/v1", "https://w3id.org/security/data-integrity/v2"],
            "patch": [{"op": "add", "path": "/service/3", "value": {"id": "#s"}}],
            "targetVersionId": 2,
        })
    }

    fn options(suite: Cryptosuite) -> ProofOptions {
        ProofOptions::new(
            suite,
            "did:btc1:k1test#initialKey",
            ProofPurpose::CapabilityInvocation,
        )
    }

    fn verify_options() -> VerifyOptions {
        VerifyOptions::new(ProofPurpose::CapabilityInvocation)
    }

    #[test]
    fn test_suite_names_and_aliases() {
        for suite in [Cryptosuite::Bip340Jcs2025, Cryptosuite::Bip340Rdfc2025] {
            assert_eq!(suite.name().parse::<Cryptosuite>().unwrap(), suite);
            assert_eq!(suite.alias().parse::<Cryptosuite>().unwrap(), suite);
        }
        assert!(matches!(
            "ecdsa-jcs-2019".parse::<Cryptosuite>(),
            Err(Error::UnsupportedCryptosuite(_))
        ));
    }

    #[test]
    fn test_add_and_verify_both_suites() {
        for suite in [Cryptosuite::Bip340Jcs2025, Cryptosuite::Bip340Rdfc2025] {
            let secured = add_proof(&document(), &options(suite), &multikey()).unwrap();
            assert_eq!(secured["proof"]["cryptosuite"], suite.name());
            assert_eq!(secured["proof"]["@context"], document()["@context"]);
            assert!(secured["proof"]["proofValue"].as_str().unwrap().starts_with('z'));

            let result = verify_proof(&secured, &verify_options(), &multikey()).unwrap();
            assert!(result.verified, "{suite} did not verify");
            assert_eq!(result.verified_document, Some(document()));
        }
    }

    #[test]
    fn test_alias_name_is_signed_as_written() {
        let options = options(Cryptosuite::Bip340Jcs2025)
            .with_cryptosuite_name("schnorr-secp256k1-jcs-2025")
            .unwrap();
        let mut secured = add_proof(&document(), &options, &multikey()).unwrap();
        assert_eq!(secured["proof"]["cryptosuite"], "schnorr-secp256k1-jcs-2025");
        assert!(verify_proof(&secured, &verify_options(), &multikey()).unwrap().verified);

        // Rewriting the name changes the signed configuration.
        secured["proof"]["cryptosuite"] = json!("bip340-jcs-2025");
        assert!(!verify_proof(&secured, &verify_options(), &multikey()).unwrap().verified);
    }

    #[test]
    fn test_tampered_document_fails() {
        let mut secured =
            add_proof(&document(), &options(Cryptosuite::Bip340Jcs2025), &multikey()).unwrap();
        secured["targetVersionId"] = json!(3);

        let result = verify_proof(&secured, &verify_options(), &multikey()).unwrap();
        assert!(!result.verified);
        assert!(result.verified_document.is_none());
    }

    #[test]
    fn test_wrong_key_fails() {
        let secured =
            add_proof(&document(), &options(Cryptosuite::Bip340Jcs2025), &multikey()).unwrap();
        let other = Multikey::from_secret_key(
            "did:btc1:k1test#other",
            "did:btc1:k1test",
            SecretKey::from_slice(&[0x22; 32]).unwrap(),
        );
        assert!(!verify_proof(&secured, &verify_options(), &other).unwrap().verified);
    }

    #[test]
    fn test_purpose_domain_challenge() {
        let options = options(Cryptosuite::Bip340Jcs2025)
            .with_domain("btc1.dev")
            .with_challenge("nonce-1");
        let secured = add_proof(&document(), &options, &multikey()).unwrap();

        let mut expected = verify_options();
        expected.expected_domain = Some("btc1.dev".into());
        expected.expected_challenge = Some("nonce-1".into());
        assert!(verify_proof(&secured, &expected, &multikey()).unwrap().verified);

        let mut wrong_domain = expected.clone();
        wrong_domain.expected_domain = Some("example.com".into());
        assert!(!verify_proof(&secured, &wrong_domain, &multikey()).unwrap().verified);

        let mut wrong_challenge = expected.clone();
        wrong_challenge.expected_challenge = Some("nonce-2".into());
        assert!(!verify_proof(&secured, &wrong_challenge, &multikey()).unwrap().verified);

        let wrong_purpose = VerifyOptions::new(ProofPurpose::AssertionMethod);
        assert!(!verify_proof(&secured, &wrong_purpose, &multikey()).unwrap().verified);
    }

    #[test]
    fn test_structural_errors() {
        assert!(matches!(
            verify_proof(&document(), &verify_options(), &multikey()),
            Err(Error::MissingProof)
        ));

        let public_only = Multikey::from_multibase(
            "did:btc1:k1test#initialKey",
            "did:btc1:k1test",
            &multikey().to_multibase(),
        )
        .unwrap();
        assert!(matches!(
            add_proof(&document(), &options(Cryptosuite::Bip340Jcs2025), &public_only),
            Err(Error::Key(key::Error::MissingPrivateKey))
        ));

        let mut secured =
            add_proof(&document(), &options(Cryptosuite::Bip340Jcs2025), &multikey()).unwrap();
        secured["proof"]["proofValue"] = json!("not-multibase!");
        assert!(matches!(
            verify_proof(&secured, &verify_options(), &multikey()),
            Err(Error::InvalidProofValue)
        ));
    }
}
