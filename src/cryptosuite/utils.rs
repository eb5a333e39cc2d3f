use super::Error;
use multibase::{Base, decode, encode};
use secp256k1::schnorr::Signature;

/// Encode a signature using Multibase (base58-btc)
pub(crate) fn multibase_encode(signature: &Signature) -> String {
    encode(Base::Base58Btc, signature.serialize())
}

/// Decode a multibase encoded signature
pub(crate) fn multibase_decode(proof_value: &str) -> Result<Signature, Error> {
    let (_, bytes) = decode(proof_value).map_err(|_| Error::InvalidProofValue)?;

    Signature::from_slice(&bytes).map_err(|_| Error::InvalidProofValue)
}
