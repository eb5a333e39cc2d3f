use base58::{FromBase58 as _, ToBase58 as _};
use onlyerror::Error;
use secp256k1::schnorr::Signature;
use secp256k1::{Keypair, Message, Secp256k1};
use serde_json::{Value, json};
pub use secp256k1::{PublicKey, SecretKey, XOnlyPublicKey};

/// Multikey header for a BIP-340 x-only secp256k1 public key.
///
/// Every multibase-encoded key produced or accepted by this crate is `z` followed by
/// base58btc(`0xe1 0x4a` || 32-byte x-only key).
pub const MULTIKEY_PREFIX: [u8; 2] = [0xe1, 0x4a];

/// Verification method type used for BIP-340 keys in DID documents.
pub const MULTIKEY_TYPE: &str = "Multikey";

#[derive(Error, Debug)]
pub enum Error {
    /// Failed to create public key from bytes
    InvalidBytesForPublicKey(#[source] secp256k1::Error),

    /// Failed to create secret key from bytes
    InvalidBytesForSecretKey(#[source] secp256k1::Error),

    /// Multikey must start with 'z' (base58-btc)
    MultibasePrefix,

    /// Failed to decode base58
    MultikeyBase58,

    /// Invalid Multikey prefix for secp256k1 x-only public key
    #[error("Invalid Multikey prefix `{0}`, expected `e14a`")]
    InvalidMultikeyPrefix(String),

    /// Public key is not derived from the secret key
    KeyPairMismatch,

    /// Multikey has no secret key and cannot sign
    MissingPrivateKey,

    /// Malformed Schnorr signature bytes
    InvalidSignature(#[source] secp256k1::Error),
}

pub trait PublicKeyExt {
    /// Create a key from a BIP-340 Multikey.
    fn from_multikey(multikey: &str) -> Result<Self, Error>
    where
        Self: Sized;

    /// Encode a key into a BIP-340 Multikey.
    fn to_multikey(&self) -> String;
}

pub trait SecretKeyExt {
    /// Generate a new random secret key.
    fn generate() -> Self;
}

impl PublicKeyExt for XOnlyPublicKey {
    fn from_multikey(multikey: &str) -> Result<Self, Error> {
        let (_, key) = decode_multikey(multikey)?;
        Ok(key)
    }

    fn to_multikey(&self) -> String {
        encode_multikey(self)
    }
}

impl PublicKeyExt for PublicKey {
    /// The multikey only carries the x coordinate, so the even-y lift is returned.
    fn from_multikey(multikey: &str) -> Result<Self, Error> {
        let (_, key) = decode_multikey(multikey)?;
        Ok(key.public_key(secp256k1::Parity::Even))
    }

    fn to_multikey(&self) -> String {
        encode_multikey(&self.x_only_public_key().0)
    }
}

impl SecretKeyExt for SecretKey {
    fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;

        Self::new(&mut rng)
    }
}

/// Encode an x-only public key as `z` + base58btc(header || key).
pub fn encode_multikey(public_key: &XOnlyPublicKey) -> String {
    let key_bytes = public_key.serialize();

    let mut data = Vec::with_capacity(MULTIKEY_PREFIX.len() + key_bytes.len());
    data.extend_from_slice(&MULTIKEY_PREFIX);
    data.extend_from_slice(&key_bytes);

    format!("z{}", data.to_base58())
}

/// Decode a multibase Multikey into its two-byte header and x-only public key.
pub fn decode_multikey(multikey: &str) -> Result<([u8; 2], XOnlyPublicKey), Error> {
    let Some(encoded) = multikey.strip_prefix('z') else {
        return Err(Error::MultibasePrefix);
    };

    let data = encoded.from_base58().map_err(|_| Error::MultikeyBase58)?;

    let Some((prefix, key_bytes)) = data.split_first_chunk::<2>() else {
        return Err(Error::InvalidMultikeyPrefix(hex::encode(&data)));
    };
    if prefix != &MULTIKEY_PREFIX {
        return Err(Error::InvalidMultikeyPrefix(hex::encode(prefix)));
    }

    let key = XOnlyPublicKey::from_slice(key_bytes).map_err(Error::InvalidBytesForPublicKey)?;

    Ok((*prefix, key))
}

/// Sign a 32-byte message hash with BIP-340, drawing fresh auxiliary randomness.
pub fn schnorr_sign(secret_key: &SecretKey, message_hash: [u8; 32]) -> Signature {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_secret_key(&secp, secret_key);

    secp.sign_schnorr(&Message::from_digest(message_hash), &keypair)
}

/// Sign a 32-byte message hash with BIP-340 using caller-provided auxiliary randomness.
pub fn schnorr_sign_with_aux_rand(
    secret_key: &SecretKey,
    message_hash: [u8; 32],
    aux_rand: &[u8; 32],
) -> Signature {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_secret_key(&secp, secret_key);

    secp.sign_schnorr_with_aux_rand(&Message::from_digest(message_hash), &keypair, aux_rand)
}

/// Verify a BIP-340 signature. Never errors: any mismatch is `false`.
pub fn schnorr_verify(
    public_key: &XOnlyPublicKey,
    message_hash: [u8; 32],
    signature: &Signature,
) -> bool {
    let secp = Secp256k1::verification_only();

    secp.verify_schnorr(signature, &Message::from_digest(message_hash), public_key)
        .is_ok()
}

/// A BIP-340 verification key with an optional signing half.
///
/// Immutable once constructed; safe to share across threads for concurrent verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Multikey {
    id: String,
    controller: String,
    public_key: XOnlyPublicKey,
    secret_key: Option<SecretKey>,
}

impl Multikey {
    /// Build a multikey, checking that `public_key` is the x-only lift of `secret_key`.
    pub fn new(
        id: impl Into<String>,
        controller: impl Into<String>,
        public_key: XOnlyPublicKey,
        secret_key: Option<SecretKey>,
    ) -> Result<Self, Error> {
        if let Some(secret_key) = secret_key.as_ref() {
            let (derived, _parity) = secret_key.x_only_public_key(&Secp256k1::signing_only());
            if derived != public_key {
                return Err(Error::KeyPairMismatch);
            }
        }

        Ok(Self {
            id: id.into(),
            controller: controller.into(),
            public_key,
            secret_key,
        })
    }

    pub fn from_secret_key(
        id: impl Into<String>,
        controller: impl Into<String>,
        secret_key: SecretKey,
    ) -> Self {
        let (public_key, _parity) = secret_key.x_only_public_key(&Secp256k1::signing_only());

        Self {
            id: id.into(),
            controller: controller.into(),
            public_key,
            secret_key: Some(secret_key),
        }
    }

    pub fn from_multibase(
        id: impl Into<String>,
        controller: impl Into<String>,
        multibase: &str,
    ) -> Result<Self, Error> {
        let (_, public_key) = decode_multikey(multibase)?;
        Self::new(id, controller, public_key, None)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn public_key(&self) -> &XOnlyPublicKey {
        &self.public_key
    }

    pub fn has_secret_key(&self) -> bool {
        self.secret_key.is_some()
    }

    pub fn to_multibase(&self) -> String {
        encode_multikey(&self.public_key)
    }

    pub fn sign(&self, message_hash: [u8; 32]) -> Result<Signature, Error> {
        let secret_key = self.secret_key.as_ref().ok_or(Error::MissingPrivateKey)?;

        Ok(schnorr_sign(secret_key, message_hash))
    }

    pub fn verify(&self, message_hash: [u8; 32], signature: &Signature) -> bool {
        schnorr_verify(&self.public_key, message_hash, signature)
    }

    /// The DID document `verificationMethod` entry for this key.
    pub fn to_verification_method(&self) -> Value {
        json!({
            "id": self.id,
            "type": MULTIKEY_TYPE,
            "controller": self.controller,
            "publicKeyMultibase": self.to_multibase(),
        })
    }
}

/// Represents a key pair (public and secret key)
#[derive(Clone, Debug)]
pub struct KeyPair {
    /// The public key
    pub public_key: PublicKey,
    /// The secret key
    pub secret_key: SecretKey,
}

impl KeyPair {
    /// Create a new key pair from a secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = secret_key.public_key(&secp);
        Self {
            public_key,
            secret_key,
        }
    }

    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_secret_key(SecretKey::generate())
    }

    /// View this key pair as a signing multikey.
    pub fn to_multikey(&self, id: impl Into<String>, controller: impl Into<String>) -> Multikey {
        Multikey::from_secret_key(id, controller, self.secret_key)
    }
}
