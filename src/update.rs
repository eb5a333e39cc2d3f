//! DID update payloads: a JSON Patch bound to the hashes of the document it applies to and the
//! document it produces, authorized by invoking the DID's root capability.

use crate::canonical_hash::{self, CanonicalHash, Sha256Hash};
use crate::cryptosuite::{self, Cryptosuite, ProofOptions, VerifyOptions, add_proof, verify_proof};
use crate::document::{self, Document};
use crate::identifier::Did;
use crate::json_tools::{self, string_from_object, u64_from_object};
use crate::key::{self, Multikey};
use crate::verification::{self, VerificationMethodResolver as _, VerificationRelationship};
use crate::zcap::{
    self, CAPABILITY_ACTION_WRITE, Proof, ProofPurpose, ZCAP_CONTEXT, dereference_root_capability,
    derive_root_capability,
};
use chrono::Utc;
use json_patch::Patch;
use onlyerror::Error;
use serde_json::{Value, json};
use std::{fs, path::Path};

pub const DATA_INTEGRITY_CONTEXT: &str = "https://w3id.org/security/data-integrity/v2";
pub const JSON_LD_PATCH_CONTEXT: &str = "https://w3id.org/json-ld-patch/v1";

#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    Io(#[from] std::io::Error),

    /// JSON parse error
    Json(#[from] serde_json::Error),

    /// JSON value parse error
    JsonValue(#[from] json_tools::Error),

    /// Malformed hash
    Hash(#[from] canonical_hash::Error),

    /// Failed to apply JSON Patch
    Patch(#[from] json_patch::PatchError),

    /// Proof creation or verification failed
    Cryptosuite(#[from] cryptosuite::Error),

    /// Capability error
    Zcap(#[from] zcap::Error),

    /// Error with key operations
    Key(#[from] key::Error),

    /// Verification method error
    Verification(#[from] verification::Error),

    /// Update payload has no proof
    MissingProof,

    /// Update payload proof does not verify
    InvalidProof,

    /// Verification method may not invoke capabilities on the source document
    #[error("Verification method `{0}` is not authorized for capabilityInvocation")]
    UnauthorizedVerificationMethod(String),

    /// Invoked capability is not the root capability of the DID
    #[error("Capability `{0}` does not belong to `{1}`")]
    CapabilityMismatch(String, String),

    /// Capability action must be `Write`
    #[error("Invalid capability action `{0}`")]
    InvalidCapabilityAction(String),

    /// sourceHash does not match the source document
    SourceHashMismatch,

    /// targetHash does not match the patched document
    TargetHashMismatch,

    /// targetVersionId must follow the source version
    #[error("Expected targetVersionId {0}, found {1}")]
    VersionMismatch(u64, u64),

    /// Patch must not change the document id
    IdChanged,

    /// Patched document is not a valid DID document
    #[error("Patched document is invalid: {0}")]
    InvalidTargetDocument(String),
}

/// A parsed update payload. The JSON it was parsed from is kept verbatim, since its canonical
/// hash is what beacons announce.
#[derive(Clone, Debug)]
pub struct DidUpdatePayload {
    json: Value,
    patch: Patch,
    source_hash: Sha256Hash,
    target_hash: Sha256Hash,
    target_version_id: u64,
}

impl DidUpdatePayload {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let json = fs::read_to_string(path)?;

        Self::from_json_string(&json)
    }

    pub fn from_json_string(json: &str) -> Result<Self, Error> {
        let json = serde_json::from_str(json)?;

        Self::from_json_value(json)
    }

    pub fn from_json_value(json: Value) -> Result<Self, Error> {
        if json["patch"].is_null() {
            return Err(json_tools::Error::JsonMissingElement("patch".into()))?;
        }
        let patch = serde_json::from_value(json["patch"].clone())?;
        let source_hash = Sha256Hash::from_multibase(string_from_object(&json, "sourceHash")?)?;
        let target_hash = Sha256Hash::from_multibase(string_from_object(&json, "targetHash")?)?;
        let target_version_id = u64_from_object(&json, "targetVersionId")?;

        Ok(Self {
            json,
            patch,
            source_hash,
            target_hash,
            target_version_id,
        })
    }

    pub fn json(&self) -> &Value {
        &self.json
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn source_hash(&self) -> Sha256Hash {
        self.source_hash
    }

    pub fn target_hash(&self) -> Sha256Hash {
        self.target_hash
    }

    pub fn target_version_id(&self) -> u64 {
        self.target_version_id
    }

    pub fn proof(&self) -> Option<&Value> {
        self.json.get("proof")
    }

    /// The payload without its proof.
    pub fn unsigned(&self) -> Value {
        let mut json = self.json.clone();
        if let Some(object) = json.as_object_mut() {
            object.remove("proof");
        }

        json
    }
}

impl AsRef<Value> for DidUpdatePayload {
    fn as_ref(&self) -> &Value {
        &self.json
    }
}

impl CanonicalHash for DidUpdatePayload {}

/// Build an unsigned update taking `source_document` at `source_version_id` to the result of
/// `patch`.
pub fn construct(
    source_document: &Document,
    patch: Patch,
    source_version_id: u64,
) -> Result<DidUpdatePayload, Error> {
    let target_document = apply_patch(source_document, &patch)?;

    let json = json!({
        "@context": [ZCAP_CONTEXT, DATA_INTEGRITY_CONTEXT, JSON_LD_PATCH_CONTEXT],
        "patch": patch,
        "sourceHash": source_document.hash().to_multibase(),
        "targetHash": target_document.hash().to_multibase(),
        "targetVersionId": source_version_id + 1,
    });

    DidUpdatePayload::from_json_value(json)
}

/// Sign `update_payload` with a capabilityInvocation proof over the root capability of `did`.
///
/// `multikey` must carry its secret key and its id must be the verification method id.
pub fn invoke(
    update_payload: &DidUpdatePayload,
    did: &Did,
    multikey: &Multikey,
    cryptosuite: Cryptosuite,
) -> Result<DidUpdatePayload, Error> {
    let root_capability = derive_root_capability(did);
    let options = ProofOptions::new(
        cryptosuite,
        multikey.id(),
        ProofPurpose::CapabilityInvocation,
    )
    .with_capability(root_capability.id, CAPABILITY_ACTION_WRITE)
    .with_created(Utc::now());

    let secured = add_proof(&update_payload.unsigned(), &options, multikey)?;

    DidUpdatePayload::from_json_value(secured)
}

/// Check that `invocation` is authorized to update `source_document`: the proof verifies with a
/// capabilityInvocation method of the source document, invokes the root capability of
/// `expected_controller`, and the sourceHash matches.
pub fn authorize(
    invocation: &DidUpdatePayload,
    expected_controller: &Did,
    source_document: &Document,
) -> Result<(), Error> {
    let proof_json = invocation.proof().ok_or(Error::MissingProof)?;
    let proof: Proof = serde_json::from_value(proof_json.clone())?;

    let capability = proof.capability.as_deref().unwrap_or_default();
    let root_capability = dereference_root_capability(capability)?;
    if root_capability.invocation_target != expected_controller.encode() {
        return Err(Error::CapabilityMismatch(
            capability.to_string(),
            expected_controller.to_string(),
        ));
    }

    let action = proof.capability_action.as_deref().unwrap_or_default();
    if action != CAPABILITY_ACTION_WRITE {
        return Err(Error::InvalidCapabilityAction(action.to_string()));
    }

    if !source_document.authorizes(
        VerificationRelationship::CapabilityInvocation,
        &proof.verification_method,
    ) {
        return Err(Error::UnauthorizedVerificationMethod(proof.verification_method));
    }

    let multikey = source_document
        .resolve_verification_method(&proof.verification_method)?
        .to_multikey(source_document.did().encode())?;

    let options = VerifyOptions::new(ProofPurpose::CapabilityInvocation);
    if !verify_proof(invocation.json(), &options, &multikey)?.verified {
        return Err(Error::InvalidProof);
    }

    if invocation.source_hash() != source_document.hash() {
        return Err(Error::SourceHashMismatch);
    }

    Ok(())
}

/// Apply the patch of `invocation` to `source_document`, checking the targetHash.
pub fn apply(invocation: &DidUpdatePayload, source_document: &Document) -> Result<Document, Error> {
    let target_document = apply_patch(source_document, invocation.patch())?;

    if target_document.hash() != invocation.target_hash() {
        return Err(Error::TargetHashMismatch);
    }

    Ok(target_document)
}

/// The update must move `current_version_id` forward by exactly one.
pub fn check_version(invocation: &DidUpdatePayload, current_version_id: u64) -> Result<(), Error> {
    let expected = current_version_id + 1;
    if invocation.target_version_id() != expected {
        return Err(Error::VersionMismatch(expected, invocation.target_version_id()));
    }

    Ok(())
}

/// Authorize and apply `invocation`, returning the updated document.
pub fn verify(
    invocation: &DidUpdatePayload,
    expected_controller: &Did,
    source_document: &Document,
) -> Result<Document, Error> {
    authorize(invocation, expected_controller, source_document)?;

    apply(invocation, source_document)
}

/// Construct and sign an update in one step.
pub fn prepare_update(
    source_document: &Document,
    source_version_id: u64,
    patch: Patch,
    multikey: &Multikey,
    cryptosuite: Cryptosuite,
) -> Result<DidUpdatePayload, Error> {
    let update_payload = construct(source_document, patch, source_version_id)?;

    invoke(&update_payload, source_document.did(), multikey, cryptosuite)
}

/// Prepare the update that marks the document deactivated.
pub fn prepare_deactivation(
    source_document: &Document,
    source_version_id: u64,
    multikey: &Multikey,
    cryptosuite: Cryptosuite,
) -> Result<DidUpdatePayload, Error> {
    let patch = serde_json::from_value(json!([
        { "op": "add", "path": "/deactivated", "value": true }
    ]))?;

    prepare_update(source_document, source_version_id, patch, multikey, cryptosuite)
}

fn apply_patch(source_document: &Document, patch: &Patch) -> Result<Document, Error> {
    let mut target = source_document.json().clone();
    json_patch::patch(&mut target, &patch.0)?;

    Document::for_did(source_document.did(), target).map_err(|err| match err {
        document::Error::IdMismatch(..) | document::Error::DidEncoding(_) => Error::IdChanged,
        err => Error::InvalidTargetDocument(err.to_string()),
    })
}
