//! Beacons announce DID updates on chain.
//!
//! A beacon is a DID document service whose endpoint is a Bitcoin address. Spending from that
//! address with an `OP_RETURN` output carrying the hash of an update payload signals the update.
//! Only singleton beacons are implemented; aggregate beacons report [`Error::NotImplemented`].

use crate::canonical_hash::{CanonicalHash as _, canonical_hash};
use crate::chain::BlockTx;
use crate::resolution::SidecarData;
use crate::service::Service;
use crate::update::DidUpdatePayload;
use bitcoin::absolute::LockTime;
use bitcoin::script::{Instruction, PushBytes, PushBytesError};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
    address::Address,
};
use onlyerror::Error;
use std::{fmt, str::FromStr};
use tracing::{debug, warn};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Invalid beacon type
    #[error("Invalid beacon type `{0}`")]
    InvalidBeaconType(String),

    /// Beacon type is recognized but not implemented
    #[error("{0} is not implemented")]
    NotImplemented(String),

    /// Missing or empty 'serviceEndpoint' attribute
    InvalidBeaconDescriptor,

    /// Invalid BIP21 address.
    InvalidBip21,

    /// Bitcoin Address Parse error
    AddressParse(#[from] bitcoin::address::ParseError),

    /// Signal payload does not fit in a script push
    PushBytes(#[from] PushBytesError),

    /// Sidecar update payload matched the signal but is not an update payload
    #[error("Invalid sidecar data: {0}")]
    InvalidSidecarData(String),
}

/// Extension trait for [`Address`]. Allows parsing from [BIP21] URI.
///
/// [BIP21]: https://github.com/bitcoin/bips/blob/master/bip-0021.mediawiki
pub trait AddressExt {
    fn from_bip21(uri: &str, network: Network) -> Result<Self, Error>
    where
        Self: Sized;

    /// Parse a beacon endpoint, which is either a BIP21 URI or a bare address.
    fn from_endpoint(endpoint: &str, network: Network) -> Result<Self, Error>
    where
        Self: Sized;
}

impl AddressExt for Address {
    fn from_bip21(uri: &str, network: Network) -> Result<Self, Error> {
        let address = uri.strip_prefix("bitcoin:").ok_or(Error::InvalidBip21)?;
        let address = address
            .split_once('?')
            .map(|(addr, _params)| addr)
            .unwrap_or(address);

        Ok(address.parse::<Address<_>>()?.require_network(network)?)
    }

    fn from_endpoint(endpoint: &str, network: Network) -> Result<Self, Error> {
        if endpoint.starts_with("bitcoin:") {
            Self::from_bip21(endpoint, network)
        } else {
            Ok(endpoint.parse::<Address<_>>()?.require_network(network)?)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BeaconType {
    Singleton,
    CidAggregate,
    SmtAggregate,
}

impl BeaconType {
    /// Whether a service `type` names any beacon, known or not.
    pub fn is_beacon_type(ty: &str) -> bool {
        ty.ends_with("Beacon")
    }
}

impl FromStr for BeaconType {
    type Err = Error;

    fn from_str(ty: &str) -> Result<Self, Self::Err> {
        match ty {
            "SingletonBeacon" => Ok(Self::Singleton),
            "CIDAggregateBeacon" | "MapBeacon" => Ok(Self::CidAggregate),
            "SMTAggregateBeacon" | "SMTBeacon" => Ok(Self::SmtAggregate),
            _ => Err(Error::InvalidBeaconType(ty.to_string())),
        }
    }
}

impl fmt::Display for BeaconType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => f.write_str("SingletonBeacon"),
            Self::CidAggregate => f.write_str("CIDAggregateBeacon"),
            Self::SmtAggregate => f.write_str("SMTAggregateBeacon"),
        }
    }
}

/// Signal processing and generation, per beacon type.
pub trait BeaconSignal {
    /// Extract the update payload announced by `tx`, if any.
    ///
    /// Returns `None` when `tx` is not a signal from this beacon, or when the sidecar has no
    /// payload matching the announced hash.
    fn process_signal(
        &self,
        tx: &BlockTx,
        sidecar_data: Option<&SidecarData>,
    ) -> Result<Option<DidUpdatePayload>, Error>;

    /// Build an unsigned transaction spending `funding` that announces `update_payload`.
    ///
    /// `funding` must be an output locked to the beacon address.
    fn generate_signal(
        &self,
        update_payload: &DidUpdatePayload,
        funding: OutPoint,
    ) -> Result<Transaction, Error>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingletonBeacon {
    id: String,
    address: Address,
}

impl SingletonBeacon {
    pub fn new(id: impl Into<String>, address: Address) -> Self {
        Self {
            id: id.into(),
            address,
        }
    }
}

impl BeaconSignal for SingletonBeacon {
    fn process_signal(
        &self,
        tx: &BlockTx,
        sidecar_data: Option<&SidecarData>,
    ) -> Result<Option<DidUpdatePayload>, Error> {
        if !spends_from(tx, &self.address) {
            return Ok(None);
        }

        let Some(signal) = signal_bytes(&tx.transaction) else {
            debug!(beacon = %self.id, "beacon spend without a 32 byte OP_RETURN");
            return Ok(None);
        };

        let txid = tx.transaction.compute_txid();
        let Some(metadata) = sidecar_data.and_then(|data| data.signals_metadata.get(&txid)) else {
            warn!(%txid, beacon = %self.id, "no sidecar update payload for beacon signal");
            return Ok(None);
        };

        let payload_hash = canonical_hash(&metadata.update_payload);
        if payload_hash.0 != signal {
            warn!(%txid, beacon = %self.id, %payload_hash, "sidecar update payload does not match signal");
            return Ok(None);
        }

        let update_payload = DidUpdatePayload::from_json_value(metadata.update_payload.clone())
            .map_err(|err| Error::InvalidSidecarData(err.to_string()))?;

        Ok(Some(update_payload))
    }

    fn generate_signal(
        &self,
        update_payload: &DidUpdatePayload,
        funding: OutPoint,
    ) -> Result<Transaction, Error> {
        let hash = update_payload.hash();
        let push = <&PushBytes>::try_from(&hash.0[..])?;

        Ok(Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: funding,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::ZERO,
                script_pubkey: ScriptBuf::new_op_return(push),
            }],
        })
    }
}

/// Aggregate beacons share one signal between many DIDs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateBeacon {
    id: String,
    address: Address,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Beacon {
    Singleton(SingletonBeacon),
    CidAggregate(AggregateBeacon),
    SmtAggregate(AggregateBeacon),
}

impl Beacon {
    pub fn id(&self) -> &str {
        match self {
            Self::Singleton(beacon) => &beacon.id,
            Self::CidAggregate(beacon) | Self::SmtAggregate(beacon) => &beacon.id,
        }
    }

    pub fn ty(&self) -> BeaconType {
        match self {
            Self::Singleton(_) => BeaconType::Singleton,
            Self::CidAggregate(_) => BeaconType::CidAggregate,
            Self::SmtAggregate(_) => BeaconType::SmtAggregate,
        }
    }

    pub fn address(&self) -> &Address {
        match self {
            Self::Singleton(beacon) => &beacon.address,
            Self::CidAggregate(beacon) | Self::SmtAggregate(beacon) => &beacon.address,
        }
    }

    /// Whether any input of `tx` spends from the beacon address.
    pub fn is_spent_by(&self, tx: &BlockTx) -> bool {
        spends_from(tx, self.address())
    }
}

impl BeaconSignal for Beacon {
    fn process_signal(
        &self,
        tx: &BlockTx,
        sidecar_data: Option<&SidecarData>,
    ) -> Result<Option<DidUpdatePayload>, Error> {
        match self {
            Self::Singleton(beacon) => beacon.process_signal(tx, sidecar_data),
            _ => Err(Error::NotImplemented(self.ty().to_string())),
        }
    }

    fn generate_signal(
        &self,
        update_payload: &DidUpdatePayload,
        funding: OutPoint,
    ) -> Result<Transaction, Error> {
        match self {
            Self::Singleton(beacon) => beacon.generate_signal(update_payload, funding),
            _ => Err(Error::NotImplemented(self.ty().to_string())),
        }
    }
}

/// Build the beacon described by a DID document service entry.
pub fn establish(service: &Service, network: Network) -> Result<Beacon, Error> {
    let ty = service
        .types()
        .iter()
        .find_map(|ty| ty.parse::<BeaconType>().ok())
        .ok_or_else(|| Error::InvalidBeaconType(service.types().join(", ")))?;

    let [endpoint] = service.endpoints() else {
        return Err(Error::InvalidBeaconDescriptor);
    };
    let address = Address::from_endpoint(endpoint, network)?;
    let id = service.id().unwrap_or_default().to_string();

    Ok(match ty {
        BeaconType::Singleton => Beacon::Singleton(SingletonBeacon::new(id, address)),
        BeaconType::CidAggregate => Beacon::CidAggregate(AggregateBeacon { id, address }),
        BeaconType::SmtAggregate => Beacon::SmtAggregate(AggregateBeacon { id, address }),
    })
}

fn spends_from(tx: &BlockTx, address: &Address) -> bool {
    let script_pubkey = address.script_pubkey();

    tx.prevouts
        .iter()
        .any(|prevout| prevout.script_pubkey == script_pubkey)
}

/// The first `OP_RETURN` output carrying exactly one 32 byte push.
pub(crate) fn signal_bytes(tx: &Transaction) -> Option<[u8; 32]> {
    tx.output
        .iter()
        .filter(|output| output.script_pubkey.is_op_return())
        .find_map(|output| {
            // Skip the OP_RETURN itself
            let mut instructions = output.script_pubkey.instructions().skip(1);
            match (instructions.next(), instructions.next()) {
                (Some(Ok(Instruction::PushBytes(bytes))), None) => bytes.as_bytes().try_into().ok(),
                _ => None,
            }
        })
}
