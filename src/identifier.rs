//! # did:btc1 identifiers
//!
//! A did:btc1 identifier consists of:
//! - the `did:btc1:` prefix
//! - an optional `<network>:` segment (accepted when decoding, never emitted)
//! - a Bech32m string whose human-readable part is `k` (key) or `x` (external) and whose data is:
//!   - version minus one (high nibble) and network (low nibble) in the first byte
//!   - genesis bytes: a 33-byte compressed secp256k1 key, or a 32-byte SHA-256 hash
//!
//! ## Examples
//!
//! ```rust
//! use did_btc1::identifier::{Did, DidVersion, Error, IdType, Network};
//! use did_btc1::key::PublicKeyExt as _;
//!
//! let did: Did = "did:btc1:k1qqpuwwde82nennsavvf0lqfnlvx7frrgzs57lchr02q8mz49qzaaxmqphnvcx"
//!     .parse()?;
//!
//! let components = did.components();
//! assert_eq!(components.version(), DidVersion::One);
//! assert_eq!(components.network(), Network::Mainnet);
//! assert!(matches!(components.id_type(), IdType::Key(_)));
//!
//! if let Some(public_key) = did.public_key() {
//!     println!("{}", public_key.to_multikey());
//! }
//! # Ok::<(), Error>(())
//! ```

use crate::key::PublicKey;
use bech32::primitives::decode::{CheckedHrpstring, CheckedHrpstringError};
use bech32::{Bech32m, EncodeError, Hrp};
use onlyerror::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// The DID method prefix for BTC1 identifiers
pub const DID_BTC1_PREFIX: &str = "did:btc1:";

/// Human-readable part for key-based DID identifiers
pub const HRP_KEY: &str = "k";

/// Human-readable part for external document-based DID identifiers
pub const HRP_EXTERNAL: &str = "x";

/// Expected length of a compressed secp256k1 public key
pub const SECP256K1_COMPRESSED_KEY_LEN: usize = 33;

/// Expected length of a SHA-256 hash
pub const SHA256_HASH_LEN: usize = 32;

/// Errors that can occur during DID identifier encoding/decoding
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid DID format - missing or incorrect prefix
    #[error("Invalid DID format: {0}")]
    InvalidDidFormat(String),

    /// Invalid version number
    #[error("Invalid version: {0} (only version 1 is defined)")]
    InvalidVersion(u8),

    /// Invalid network identifier
    #[error("Invalid network identifier: {0}")]
    InvalidNetwork(String),

    /// Invalid human-readable part
    #[error("Invalid HRP: {0} (must be 'k' or 'x')")]
    InvalidHrp(String),

    /// Invalid genesis bytes length
    #[error("Invalid genesis bytes length: {0} (expected {1})")]
    InvalidGenesisLength(usize, usize),

    /// Bech32m checksum or character set error
    #[error("Bech32m error: {0}")]
    Bech32(#[from] CheckedHrpstringError),

    /// Bech32m encoding error
    #[error("Bech32m encoding error: {0}")]
    Bech32Encode(#[from] EncodeError),

    /// Genesis key is not a valid secp256k1 point
    Key(#[from] crate::key::Error),
}

/// A parsed did:btc1 identifier, holding both the canonical encoding and its components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Did {
    encoded: String,
    components: DidComponents,
}

impl FromStr for Did {
    type Err = Error;

    fn from_str(did: &str) -> Result<Self, Self::Err> {
        let components = parse_did_identifier(did)?;
        Self::new(components)
    }
}

impl TryFrom<DidComponents> for Did {
    type Error = Error;

    fn try_from(components: DidComponents) -> Result<Self, Self::Error> {
        Self::new(components)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encoded)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let did = String::deserialize(deserializer)?;
        did.parse().map_err(serde::de::Error::custom)
    }
}

impl Did {
    /// Encode components into their canonical identifier string.
    pub fn new(components: DidComponents) -> Result<Self, Error> {
        let encoded = encode_did_identifier(&components)?;

        Ok(Self {
            encoded,
            components,
        })
    }

    /// The canonical identifier string (without any network segment).
    pub fn encode(&self) -> &str {
        &self.encoded
    }

    pub fn components(&self) -> &DidComponents {
        &self.components
    }

    /// The genesis public key for key-based identifiers.
    pub fn public_key(&self) -> Option<PublicKey> {
        match self.components.id_type {
            IdType::Key(key) => PublicKey::from_slice(&key).ok(),
            IdType::External(_) => None,
        }
    }
}

/// did:btc1 encoding version
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DidVersion {
    #[default]
    One = 1,
}

impl TryFrom<u8> for DidVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            _ => Err(Error::InvalidVersion(value)),
        }
    }
}

impl From<DidVersion> for u8 {
    fn from(value: DidVersion) -> Self {
        value as u8
    }
}

/// Bitcoin networks supported by did:btc1
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// Bitcoin mainnet
    #[default]
    Mainnet,
    /// Bitcoin signet
    Signet,
    /// Bitcoin regtest
    Regtest,
    /// Bitcoin testnet v3
    TestnetV3,
    /// Bitcoin testnet v4
    TestnetV4,
    /// Mutinynet
    Mutinynet,
    /// Custom test network (nibble 6-15)
    Custom(u8),
}

impl TryFrom<u8> for Network {
    type Error = Error;

    fn try_from(nibble: u8) -> Result<Self, Self::Error> {
        match nibble {
            0 => Ok(Network::Mainnet),
            1 => Ok(Network::Signet),
            2 => Ok(Network::Regtest),
            3 => Ok(Network::TestnetV3),
            4 => Ok(Network::TestnetV4),
            5 => Ok(Network::Mutinynet),
            6..=15 => Ok(Network::Custom(nibble)),
            _ => Err(Error::InvalidNetwork(nibble.to_string())),
        }
    }
}

impl From<Network> for u8 {
    fn from(value: Network) -> Self {
        match value {
            Network::Mainnet => 0,
            Network::Signet => 1,
            Network::Regtest => 2,
            Network::TestnetV3 => 3,
            Network::TestnetV4 => 4,
            Network::Mutinynet => 5,
            Network::Custom(n) => n,
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "mainnet" | "bitcoin" => Ok(Network::Mainnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            "testnet" | "testnet3" => Ok(Network::TestnetV3),
            "testnet4" => Ok(Network::TestnetV4),
            "mutinynet" => Ok(Network::Mutinynet),
            _ => Err(Error::InvalidNetwork(name.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Signet => f.write_str("signet"),
            Network::Regtest => f.write_str("regtest"),
            Network::TestnetV3 => f.write_str("testnet3"),
            Network::TestnetV4 => f.write_str("testnet4"),
            Network::Mutinynet => f.write_str("mutinynet"),
            Network::Custom(n) => write!(f, "custom{n}"),
        }
    }
}

impl Serialize for Network {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl From<Network> for bitcoin::Network {
    /// Address encoding network. Testnet4, Mutinynet and custom networks share address formats
    /// with testnet and signet.
    fn from(network: Network) -> Self {
        match network {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Signet | Network::Mutinynet | Network::Custom(_) => bitcoin::Network::Signet,
            Network::Regtest => bitcoin::Network::Regtest,
            Network::TestnetV3 | Network::TestnetV4 => bitcoin::Network::Testnet,
        }
    }
}

/// Type of DID identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdType {
    /// Key-based identifier (secp256k1 public key)
    Key([u8; SECP256K1_COMPRESSED_KEY_LEN]),
    /// External document-based identifier (hash of external document)
    External([u8; SHA256_HASH_LEN]),
}

impl From<PublicKey> for IdType {
    fn from(key: PublicKey) -> Self {
        Self::Key(key.serialize())
    }
}

impl IdType {
    /// Create External from byte slice. Slice must be exactly 32 bytes long.
    pub fn from_sha256_hash(hash: &[u8]) -> Result<Self, Error> {
        Ok(IdType::External(hash.try_into().map_err(|_| {
            Error::InvalidGenesisLength(hash.len(), SHA256_HASH_LEN)
        })?))
    }

    /// Get the human-readable part for this identifier type
    pub fn hrp(&self) -> &'static str {
        match self {
            IdType::Key(_) => HRP_KEY,
            IdType::External(_) => HRP_EXTERNAL,
        }
    }

    pub fn genesis_bytes(&self) -> &[u8] {
        match self {
            IdType::Key(key) => &key[..],
            IdType::External(hash) => &hash[..],
        }
    }

    fn from_hrp_and_bytes(hrp: &str, bytes: &[u8]) -> Result<Self, Error> {
        let expected_len = match hrp {
            HRP_KEY => SECP256K1_COMPRESSED_KEY_LEN,
            HRP_EXTERNAL => SHA256_HASH_LEN,
            _ => return Err(Error::InvalidHrp(hrp.to_string())),
        };

        if bytes.len() != expected_len {
            return Err(Error::InvalidGenesisLength(bytes.len(), expected_len));
        }

        if hrp == HRP_KEY {
            let key = PublicKey::from_slice(bytes)
                .map_err(crate::key::Error::InvalidBytesForPublicKey)?;
            Ok(IdType::from(key))
        } else {
            IdType::from_sha256_hash(bytes)
        }
    }
}

/// Components of a parsed did:btc1 identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DidComponents {
    version: DidVersion,
    network: Network,
    id_type: IdType,
}

impl DidComponents {
    pub fn new(version: DidVersion, network: Network, id_type: IdType) -> Self {
        Self {
            version,
            network,
            id_type,
        }
    }

    pub fn version(&self) -> DidVersion {
        self.version
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn id_type(&self) -> IdType {
        self.id_type
    }

    pub fn genesis_bytes(&self) -> &[u8] {
        self.id_type.genesis_bytes()
    }
}

/// Parse a did:btc1 identifier string into its components
///
/// An optional network segment (`did:btc1:regtest:k1...`) is accepted, but it must agree with
/// the network packed into the Bech32m payload.
///
/// # Examples
///
/// ```rust
/// use did_btc1::identifier::{parse_did_identifier, DidVersion, Error, IdType, Network};
///
/// let did = "did:btc1:k1qqpuwwde82nennsavvf0lqfnlvx7frrgzs57lchr02q8mz49qzaaxmqphnvcx";
/// let components = parse_did_identifier(did)?;
///
/// assert_eq!(components.version(), DidVersion::One);
/// assert_eq!(components.network(), Network::Mainnet);
/// assert!(matches!(components.id_type(), IdType::Key(_)));
/// # Ok::<(), Error>(())
/// ```
pub fn parse_did_identifier(did: &str) -> Result<DidComponents, Error> {
    let Some(method_specific_id) = did.strip_prefix(DID_BTC1_PREFIX) else {
        return Err(Error::InvalidDidFormat(format!(
            "DID must start with '{DID_BTC1_PREFIX}'",
        )));
    };

    let (network_segment, bech32_part) = match method_specific_id.split_once(':') {
        Some((network, rest)) => (Some(network.parse::<Network>()?), rest),
        None => (None, method_specific_id),
    };

    if bech32_part.contains(':') || bech32_part.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(Error::InvalidDidFormat(
            "method-specific identifier must be a single lowercase segment".to_string(),
        ));
    }

    let checked = CheckedHrpstring::new::<Bech32m>(bech32_part)?;
    let hrp = checked.hrp().to_lowercase();
    let data: Vec<u8> = checked.byte_iter().collect();

    let Some((&version_network_byte, genesis_bytes)) = data.split_first() else {
        return Err(Error::InvalidDidFormat(
            "No data in DID identifier".to_string(),
        ));
    };

    let id_type = IdType::from_hrp_and_bytes(&hrp, genesis_bytes)?;

    // First byte contains version (high nibble) and network (low nibble)
    let version = ((version_network_byte >> 4) & 0x0F) + 1;
    let network = Network::try_from(version_network_byte & 0x0F)?;

    if let Some(segment) = network_segment {
        if segment != network {
            return Err(Error::InvalidNetwork(format!(
                "network segment `{segment}` does not match encoded network `{network}`"
            )));
        }
    }

    Ok(DidComponents::new(version.try_into()?, network, id_type))
}

/// Encode DID components into a did:btc1 identifier string
pub fn encode_did_identifier(components: &DidComponents) -> Result<String, Error> {
    let genesis_bytes = components.genesis_bytes();

    let mut data = Vec::with_capacity(1 + genesis_bytes.len());

    // First byte: version - 1 (high nibble) + network (low nibble)
    let version_nibble = (u8::from(components.version) - 1) & 0x0F;
    let network_nibble = u8::from(components.network) & 0x0F;
    data.push((version_nibble << 4) | network_nibble);

    data.extend_from_slice(genesis_bytes);

    let hrp = Hrp::parse_unchecked(components.id_type.hrp());
    let bech32_part = bech32::encode::<Bech32m>(hrp, &data)?;

    Ok(format!("{DID_BTC1_PREFIX}{bech32_part}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAINNET_KEY_DID: &str =
        "did:btc1:k1qqpuwwde82nennsavvf0lqfnlvx7frrgzs57lchr02q8mz49qzaaxmqphnvcx";
    const REGTEST_EXTERNAL_DID: &str =
        "did:btc1:x1qgcs38429dp7kyr5y90g3l94r6ky85pnppy9aggzgas2kdcldelrk3yfjrf";

    fn test_key() -> IdType {
        IdType::Key(
            hex::decode("03c739b93aa799ce1d6312ff8133fb0de48c681429efe2e37a807d8aa500bbd36c")
                .unwrap()
                .try_into()
                .unwrap(),
        )
    }

    #[test]
    fn test_network_conversion() {
        assert_eq!(Network::try_from(0).unwrap(), Network::Mainnet);
        assert_eq!(Network::try_from(1).unwrap(), Network::Signet);
        assert_eq!(Network::try_from(5).unwrap(), Network::Mutinynet);
        assert_eq!(Network::try_from(12).unwrap(), Network::Custom(12));
        assert!(Network::try_from(16).is_err());

        assert_eq!(u8::from(Network::Mainnet), 0);
        assert_eq!(u8::from(Network::Signet), 1);
        assert_eq!(u8::from(Network::Custom(12)), 12);
    }

    #[test]
    fn test_id_type_hrps() {
        assert_eq!(test_key().hrp(), "k");
        assert_eq!(IdType::External([0; SHA256_HASH_LEN]).hrp(), "x");
    }

    #[test]
    fn test_decode_known_vectors() {
        let components = parse_did_identifier(MAINNET_KEY_DID).unwrap();
        assert_eq!(components.version(), DidVersion::One);
        assert_eq!(components.network(), Network::Mainnet);
        assert_eq!(components.id_type(), test_key());

        let components = parse_did_identifier(REGTEST_EXTERNAL_DID).unwrap();
        assert_eq!(components.network(), Network::Regtest);
        assert_eq!(
            hex::encode(components.genesis_bytes()),
            "31089eaa2b43eb1074215e88fcb51eac43d03308485ea1024760ab371f6e7e3b"
        );
    }

    #[test]
    fn test_encode_matches_known_vector() {
        let components = DidComponents::new(DidVersion::One, Network::Mainnet, test_key());
        assert_eq!(encode_did_identifier(&components).unwrap(), MAINNET_KEY_DID);
    }

    #[test]
    fn test_round_trip_all_networks() {
        let networks = [
            Network::Mainnet,
            Network::Signet,
            Network::Regtest,
            Network::TestnetV3,
            Network::TestnetV4,
            Network::Mutinynet,
            Network::Custom(6),
            Network::Custom(15),
        ];

        for network in networks {
            for id_type in [test_key(), IdType::External([0xab; SHA256_HASH_LEN])] {
                let components = DidComponents::new(DidVersion::One, network, id_type);
                let did = Did::new(components.clone()).unwrap();
                let prefix = format!("{DID_BTC1_PREFIX}{}1", id_type.hrp());
                assert!(did.encode().starts_with(&prefix));

                let decoded: Did = did.encode().parse().unwrap();
                assert_eq!(decoded.components(), &components);
                assert_eq!(decoded, did);
            }
        }
    }

    #[test]
    fn test_network_segment() {
        let did = REGTEST_EXTERNAL_DID.replace("did:btc1:", "did:btc1:regtest:");
        let components = parse_did_identifier(&did).unwrap();
        assert_eq!(components.network(), Network::Regtest);

        let did = REGTEST_EXTERNAL_DID.replace("did:btc1:", "did:btc1:signet:");
        assert!(matches!(
            parse_did_identifier(&did),
            Err(Error::InvalidNetwork(_))
        ));
    }

    #[test]
    fn test_invalid_prefix() {
        let result = parse_did_identifier("did:example:123");
        assert!(matches!(result, Err(Error::InvalidDidFormat(_))));
    }

    #[test]
    fn test_bad_checksum() {
        let mut did = MAINNET_KEY_DID.to_string();
        did.pop();
        did.push('q');
        assert!(matches!(parse_did_identifier(&did), Err(Error::Bech32(_))));
    }

    #[test]
    fn test_unknown_hrp() {
        let hrp = Hrp::parse_unchecked("z");
        let encoded = bech32::encode::<Bech32m>(hrp, &[0u8; 33]).unwrap();
        let result = parse_did_identifier(&format!("{DID_BTC1_PREFIX}{encoded}"));
        assert!(matches!(result, Err(Error::InvalidHrp(_))));
    }

    #[test]
    fn test_invalid_genesis_length() {
        let hrp = Hrp::parse_unchecked(HRP_EXTERNAL);
        let encoded = bech32::encode::<Bech32m>(hrp, &[0u8; 20]).unwrap();
        let result = parse_did_identifier(&format!("{DID_BTC1_PREFIX}{encoded}"));
        assert!(matches!(result, Err(Error::InvalidGenesisLength(19, 32))));
    }

    #[test]
    fn test_invalid_version() {
        let hrp = Hrp::parse_unchecked(HRP_EXTERNAL);
        let mut data = vec![0x10];
        data.extend_from_slice(&[0u8; 32]);
        let encoded = bech32::encode::<Bech32m>(hrp, &data).unwrap();
        let result = parse_did_identifier(&format!("{DID_BTC1_PREFIX}{encoded}"));
        assert!(matches!(result, Err(Error::InvalidVersion(2))));
    }
}
