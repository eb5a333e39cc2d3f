use crate::canonicalization;
use crate::identifier::SHA256_HASH_LEN;
use multibase::Base;
use onlyerror::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest as _, Sha256};
use std::fmt;

#[derive(Error, Debug)]
pub enum Error {
    /// Hash is not valid multibase
    Multibase(#[from] multibase::Error),

    /// Hash has the wrong length
    #[error("Hash must be 32 bytes, found {0}")]
    InvalidLength(usize),
}

/// A SHA-256 digest. Serialized as multibase base58btc (`z...`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Hash(pub [u8; SHA256_HASH_LEN]);

impl Sha256Hash {
    pub fn digest(data: impl AsRef<[u8]>) -> Self {
        Self(Sha256::digest(data.as_ref()).into())
    }

    pub fn to_multibase(&self) -> String {
        multibase::encode(Base::Base58Btc, self.0)
    }

    pub fn from_multibase(encoded: &str) -> Result<Self, Error> {
        let (_, bytes) = multibase::decode(encoded)?;
        let hash = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidLength(bytes.len()))?;

        Ok(Self(hash))
    }
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Hash({})", hex::encode(self.0))
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_multibase())
    }
}

impl Serialize for Sha256Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_multibase())
    }
}

impl<'de> Deserialize<'de> for Sha256Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_multibase(&encoded).map_err(serde::de::Error::custom)
    }
}

/// SHA-256 over the JCS form of a JSON document.
pub fn canonical_hash(document: &Value) -> Sha256Hash {
    Sha256Hash::digest(canonicalization::jcs(document))
}

pub trait CanonicalHash: AsRef<Value> {
    fn hash(&self) -> Sha256Hash {
        canonical_hash(self.as_ref())
    }
}
