use crate::json_tools::{self, string_from_object};
use crate::key::{self, MULTIKEY_TYPE, Multikey};
use onlyerror::Error;
use serde_json::Value;
use std::{cmp::PartialEq, fmt, str::FromStr};

#[derive(Error, Debug)]
pub enum Error {
    /// Unsupported verification method type
    #[error("Unsupported verification method type `{0}`")]
    UnsupportedVerificationMethod(String),

    /// Verification method is not present in the document
    #[error("Verification method `{0}` not found")]
    VerificationMethodNotFound(String),

    /// Error with key operations
    Key(#[from] key::Error),
}

/// Verification method types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationMethodType {
    /// Multikey verification method
    Multikey,

    /// Other types
    Other(String),
}

impl FromStr for VerificationMethodType {
    type Err = std::convert::Infallible;

    fn from_str(ty: &str) -> Result<Self, Self::Err> {
        Ok(match ty {
            MULTIKEY_TYPE => Self::Multikey,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for VerificationMethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multikey => f.write_str(MULTIKEY_TYPE),
            Self::Other(ty) => f.write_str(ty),
        }
    }
}

/// Verification relationships a DID document can grant to its verification methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationRelationship {
    Authentication,
    AssertionMethod,
    CapabilityInvocation,
    CapabilityDelegation,
}

impl VerificationRelationship {
    pub const ALL: [Self; 4] = [
        Self::Authentication,
        Self::AssertionMethod,
        Self::CapabilityInvocation,
        Self::CapabilityDelegation,
    ];

    /// The document property holding this relationship.
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::AssertionMethod => "assertionMethod",
            Self::CapabilityInvocation => "capabilityInvocation",
            Self::CapabilityDelegation => "capabilityDelegation",
        }
    }
}

/// Verification method ID
///
/// These look like DIDs with a `#fragment`. Used to identify [`VerificationMethod`]s. A bare
/// `#fragment` is relative to the document that lists it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerificationMethodId(pub(crate) String);

impl FromStr for VerificationMethodId {
    type Err = std::convert::Infallible;

    fn from_str(method_id: &str) -> Result<Self, Self::Err> {
        Ok(Self(method_id.to_string()))
    }
}

impl fmt::Display for VerificationMethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl VerificationMethodId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn fragment(&self) -> Option<&str> {
        self.0.split_once('#').map(|(_, fragment)| fragment)
    }

    /// The absolute form of this id within the document of `did`.
    pub fn absolute(&self, did: &str) -> String {
        if self.0.starts_with('#') {
            format!("{did}{}", self.0)
        } else {
            self.0.clone()
        }
    }

    /// Whether two ids name the same method within the document of `did`.
    pub fn matches(&self, other: &str, did: &str) -> bool {
        let other = VerificationMethodId(other.to_string());

        self.absolute(did) == other.absolute(did)
    }
}

/// Represents a verification method for cryptographic proofs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMethod {
    /// Identifier for the verification method
    pub id: VerificationMethodId,

    /// Type of verification method
    pub type_: VerificationMethodType,

    /// The controller of this verification method
    pub controller: String,

    /// Multibase encoded public key
    pub public_key_multibase: String,
}

impl VerificationMethod {
    /// Create a new Multikey verification method
    pub fn new(
        id: VerificationMethodId,
        controller: impl Into<String>,
        public_key_multibase: impl Into<String>,
    ) -> Self {
        Self {
            id,
            type_: VerificationMethodType::Multikey,
            controller: controller.into(),
            public_key_multibase: public_key_multibase.into(),
        }
    }

    /// Parse a `verificationMethod` entry.
    pub fn from_json(value: &Value) -> Result<Self, json_tools::Error> {
        Ok(Self {
            id: string_from_object(value, "id")?.parse()?,
            type_: string_from_object(value, "type")?.parse()?,
            controller: string_from_object(value, "controller")?.to_string(),
            public_key_multibase: string_from_object(value, "publicKeyMultibase")?.to_string(),
        })
    }

    /// Decode the public key of this method as a verification-only [`Multikey`].
    ///
    /// `did` resolves relative ids.
    pub fn to_multikey(&self, did: &str) -> Result<Multikey, Error> {
        if self.type_ != VerificationMethodType::Multikey {
            return Err(Error::UnsupportedVerificationMethod(self.type_.to_string()));
        }

        Ok(Multikey::from_multibase(
            self.id.absolute(did),
            self.controller.clone(),
            &self.public_key_multibase,
        )?)
    }
}

/// Trait for resolving verification methods
pub trait VerificationMethodResolver {
    /// Resolve a verification method by ID
    fn resolve_verification_method(&self, id: &str) -> Result<VerificationMethod, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SecretKey;
    use serde_json::json;

    const DID: &str = "did:btc1:k1qqpuwwde82nennsavvf0lqfnlvx7frrgzs57lchr02q8mz49qzaaxmqphnvcx";

    #[test]
    fn test_relative_ids() {
        let id: VerificationMethodId = "#initialKey".parse().unwrap();
        assert_eq!(id.absolute(DID), format!("{DID}#initialKey"));
        assert_eq!(id.fragment(), Some("initialKey"));
        assert!(id.matches(&format!("{DID}#initialKey"), DID));
        assert!(!id.matches("#otherKey", DID));
    }

    #[test]
    fn test_from_json_and_to_multikey() {
        let secret = SecretKey::from_slice(&[0x42; 32]).unwrap();
        let multikey = Multikey::from_secret_key(format!("{DID}#initialKey"), DID, secret);
        let json = json!({
            "id": "#initialKey",
            "type": "Multikey",
            "controller": DID,
            "publicKeyMultibase": multikey.to_multibase(),
        });

        let method = VerificationMethod::from_json(&json).unwrap();
        let decoded = method.to_multikey(DID).unwrap();
        assert_eq!(decoded.id(), format!("{DID}#initialKey"));
        assert_eq!(decoded.public_key(), multikey.public_key());
        assert!(!decoded.has_secret_key());
    }

    #[test]
    fn test_unsupported_type() {
        let json = json!({
            "id": "#jwk",
            "type": "JsonWebKey2020",
            "controller": DID,
            "publicKeyMultibase": "z",
        });

        let method = VerificationMethod::from_json(&json).unwrap();
        assert!(matches!(
            method.to_multikey(DID),
            Err(Error::UnsupportedVerificationMethod(ty)) if ty == "JsonWebKey2020"
        ));
    }
}
