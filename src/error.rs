use onlyerror::Error;
use serde_json::{Value, json};

// Errors defined by did:btc1, DID Resolution and Data Integrity.
pub trait ProblemDetails {
    fn details(&self) -> Option<Value> {
        None
    }
}

#[derive(Error, Debug)]
pub enum Btc1Error {
    // DID Resolution errors
    //
    /// An invalid DID was detected during DID Resolution.
    InvalidDid(String),

    /// The DID document was malformed.
    InvalidDidDocument(String),

    // did:btc1 errors
    //
    /// The identifier string could not be decoded
    MalformedIdentifier(String),

    /// Multikey header was not the BIP-340 secp256k1 x-only header
    InvalidMultikeyPrefix(String),

    /// Signing requires a secret key
    MissingPrivateKey(String),

    /// Sidecar data was invalid
    InvalidSidecarData(String),

    /// Conflicting updates were announced in the same block
    LateConflictError(String),

    /// Invalid Update Proof
    InvalidUpdateProof(String),

    /// JSON Patch could not be applied to the source document
    PatchApplicationError(String),

    /// Unknown beacon type
    InvalidBeaconType(String),

    /// Beacon type is recognized but not implemented
    NotImplemented(String),

    /// Chain source failed to return a block
    ChainSourceUnavailable(String),

    /// ZCAP (Authorization Capabilities) related errors
    Zcap(String),

    /// Problems when creating or applying a DID Update
    InvalidDidUpdate(String),

    // Verifiable Credentials Data Integrity errors
    //
    /// Proof verification error
    ProofVerification(String),

    /// Proof transformation error
    ProofTransformation(String),

    /// Proof generation error
    ProofGeneration(String),
}

impl Btc1Error {
    fn detail(&self) -> &str {
        match self {
            Self::InvalidDid(detail)
            | Self::InvalidDidDocument(detail)
            | Self::MalformedIdentifier(detail)
            | Self::InvalidMultikeyPrefix(detail)
            | Self::MissingPrivateKey(detail)
            | Self::InvalidSidecarData(detail)
            | Self::LateConflictError(detail)
            | Self::InvalidUpdateProof(detail)
            | Self::PatchApplicationError(detail)
            | Self::InvalidBeaconType(detail)
            | Self::NotImplemented(detail)
            | Self::ChainSourceUnavailable(detail)
            | Self::Zcap(detail)
            | Self::InvalidDidUpdate(detail)
            | Self::ProofVerification(detail)
            | Self::ProofTransformation(detail)
            | Self::ProofGeneration(detail) => detail,
        }
    }
}

impl ProblemDetails for Btc1Error {
    fn details(&self) -> Option<Value> {
        let prefix = match self {
            Self::InvalidDid(_) | Self::InvalidDidDocument(_) => "https://www.w3.org/ns/did",
            _ => "https://btc1.dev/context/v1",
        };

        let name = match self {
            Self::InvalidDid(_) => "INVALID_DID",
            Self::InvalidDidDocument(_) => "INVALID_DID_DOCUMENT",
            Self::MalformedIdentifier(_) => "MALFORMED_IDENTIFIER",
            Self::InvalidMultikeyPrefix(_) => "INVALID_MULTIKEY_PREFIX",
            Self::MissingPrivateKey(_) => "MISSING_PRIVATE_KEY",
            Self::InvalidSidecarData(_) => "INVALID_SIDECAR_DATA",
            Self::LateConflictError(_) => "LATE_CONFLICT_ERROR",
            Self::InvalidUpdateProof(_) => "INVALID_UPDATE_PROOF",
            Self::PatchApplicationError(_) => "PATCH_APPLICATION_ERROR",
            Self::InvalidBeaconType(_) => "INVALID_BEACON_TYPE",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::ChainSourceUnavailable(_) => "CHAIN_SOURCE_UNAVAILABLE",
            Self::Zcap(_) => "ZCAP",
            Self::InvalidDidUpdate(_) => "INVALID_DID_UPDATE",
            Self::ProofVerification(_) => "PROOF_VERIFICATION_ERROR",
            Self::ProofTransformation(_) => "PROOF_TRANSFORMATION_ERROR",
            Self::ProofGeneration(_) => "PROOF_GENERATION_ERROR",
        };

        Some(json!({
            "type": format!("{prefix}#{name}"),
            "title": self.to_string(),
            "detail": self.detail(),
        }))
    }
}

impl From<crate::identifier::Error> for Btc1Error {
    fn from(err: crate::identifier::Error) -> Self {
        Self::MalformedIdentifier(err.to_string())
    }
}

impl From<crate::key::Error> for Btc1Error {
    fn from(err: crate::key::Error) -> Self {
        use crate::key::Error;

        match err {
            Error::InvalidMultikeyPrefix(_) => Self::InvalidMultikeyPrefix(err.to_string()),
            Error::MissingPrivateKey => Self::MissingPrivateKey(err.to_string()),
            _ => Self::InvalidDidDocument(err.to_string()),
        }
    }
}

impl From<crate::canonicalization::Error> for Btc1Error {
    fn from(err: crate::canonicalization::Error) -> Self {
        Self::ProofTransformation(err.to_string())
    }
}

impl From<crate::json_tools::Error> for Btc1Error {
    fn from(err: crate::json_tools::Error) -> Self {
        Self::InvalidDidDocument(err.to_string())
    }
}

impl From<crate::chain::Error> for Btc1Error {
    fn from(err: crate::chain::Error) -> Self {
        Self::ChainSourceUnavailable(err.to_string())
    }
}

impl From<crate::zcap::Error> for Btc1Error {
    fn from(err: crate::zcap::Error) -> Self {
        Self::Zcap(err.to_string())
    }
}

impl From<crate::cryptosuite::Error> for Btc1Error {
    fn from(err: crate::cryptosuite::Error) -> Self {
        use crate::cryptosuite::Error;

        match err {
            Error::Key(key_err) => key_err.into(),
            Error::Canonicalization(_) => Self::ProofTransformation(err.to_string()),
            Error::DocumentNotObject => Self::ProofGeneration(err.to_string()),
            _ => Self::ProofVerification(err.to_string()),
        }
    }
}

impl From<crate::beacon::Error> for Btc1Error {
    fn from(err: crate::beacon::Error) -> Self {
        use crate::beacon::Error;

        match err {
            Error::InvalidBeaconType(_) => Self::InvalidBeaconType(err.to_string()),
            Error::NotImplemented(_) => Self::NotImplemented(err.to_string()),
            Error::InvalidSidecarData(_) => Self::InvalidSidecarData(err.to_string()),
            _ => Self::InvalidDidDocument(err.to_string()),
        }
    }
}

impl From<crate::update::Error> for Btc1Error {
    fn from(err: crate::update::Error) -> Self {
        use crate::update::Error;

        match err {
            Error::Patch(_) => Self::PatchApplicationError(err.to_string()),
            Error::Cryptosuite(inner) => inner.into(),
            Error::Zcap(inner) => inner.into(),
            Error::MissingProof | Error::InvalidProof | Error::UnauthorizedVerificationMethod(_) => {
                Self::InvalidUpdateProof(err.to_string())
            }
            _ => Self::InvalidDidUpdate(err.to_string()),
        }
    }
}

impl From<crate::document::Error> for Btc1Error {
    fn from(err: crate::document::Error) -> Self {
        use crate::document::Error;

        match err {
            Error::Btc1Error(inner) => inner,
            Error::DidEncoding(inner) => inner.into(),
            Error::Beacon(inner) => inner.into(),
            _ => Self::InvalidDidDocument(err.to_string()),
        }
    }
}
