//! Blocking [Esplora] chain source.
//!
//! Everything is read in consensus encoding: the raw block, and the raw previous transactions of
//! those transactions that carry a beacon signal output. Other transactions cannot be signals, so
//! their prevouts are not fetched.
//!
//! [Esplora]: https://github.com/Blockstream/esplora/blob/master/API.md

use super::{Block, BlockRef, BlockTx, ChainSource, Error};
use crate::beacon::signal_bytes;
use crate::identifier::Network;
use bitcoin::consensus::Decodable;
use bitcoin::{BlockHash, Transaction, TxOut, Txid};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;

const MAX_BLOCK_BYTES: u64 = 8 * 1024 * 1024;

/// Where and how to reach an Esplora instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsploraConfig {
    /// API root, without a trailing slash
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl EsploraConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Public instance for `network`. Regtest and custom networks default to a local instance.
    pub fn for_network(network: Network) -> Self {
        Self::new(match network {
            Network::Mainnet => "https://blockstream.info/api",
            Network::TestnetV3 => "https://blockstream.info/testnet/api",
            Network::TestnetV4 => "https://mempool.space/testnet4/api",
            Network::Signet => "https://mempool.space/signet/api",
            Network::Mutinynet => "https://mutinynet.com/api",
            Network::Regtest | Network::Custom(_) => "http://localhost:3000",
        })
    }
}

/// The outputs spent by `tx`, in input order, looked up in `previous` by txid.
fn spent_outputs(
    tx: &Transaction,
    previous: &HashMap<Txid, Transaction>,
) -> Result<Vec<TxOut>, Error> {
    if tx.is_coinbase() {
        return Ok(Vec::new());
    }

    tx.input
        .iter()
        .map(|input| {
            let outpoint = input.previous_output;
            previous
                .get(&outpoint.txid)
                .and_then(|prev| prev.output.get(outpoint.vout as usize))
                .cloned()
                .ok_or_else(|| Error::Decode(format!("missing previous output {outpoint}")))
        })
        .collect()
}

fn decode<T: Decodable>(bytes: &[u8]) -> Result<T, Error> {
    bitcoin::consensus::deserialize(bytes).map_err(|err| Error::Decode(err.to_string()))
}

pub struct EsploraChain {
    agent: Agent,
    base_url: String,
}

impl EsploraChain {
    pub fn new(config: EsploraConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Self {
            agent: Agent::new_with_config(agent_config),
            base_url: config.base_url,
        }
    }

    fn call(&self, path: &str) -> Result<ureq::http::Response<ureq::Body>, Error> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "esplora request");

        self.agent.get(&url).call().map_err(|err| match err {
            ureq::Error::StatusCode(404) => Error::BlockNotFound(path.to_string()),
            err => Error::Unavailable(err.to_string()),
        })
    }

    fn get_text(&self, path: &str) -> Result<String, Error> {
        self.call(path)?
            .body_mut()
            .read_to_string()
            .map_err(|err| Error::Unavailable(err.to_string()))
    }

    fn get_bytes(&self, path: &str) -> Result<Vec<u8>, Error> {
        self.call(path)?
            .body_mut()
            .with_config()
            .limit(MAX_BLOCK_BYTES)
            .read_to_vec()
            .map_err(|err| Error::Unavailable(err.to_string()))
    }

    fn block_hash_at(&self, height: u32) -> Result<BlockHash, Error> {
        self.get_text(&format!("/block-height/{height}"))?
            .trim()
            .parse::<BlockHash>()
            .map_err(|err| Error::Decode(err.to_string()))
    }

    /// Fetch into `cache` every previous transaction spent by `tx`.
    fn fetch_previous(
        &self,
        tx: &Transaction,
        cache: &mut HashMap<Txid, Transaction>,
    ) -> Result<(), Error> {
        if tx.is_coinbase() {
            return Ok(());
        }

        for input in &tx.input {
            let txid = input.previous_output.txid;
            if !cache.contains_key(&txid) {
                let previous = decode(&self.get_bytes(&format!("/tx/{txid}/raw"))?)?;
                cache.insert(txid, previous);
            }
        }

        Ok(())
    }
}

impl ChainSource for EsploraChain {
    fn get_block(&self, block: BlockRef) -> Result<Block, Error> {
        let hash = match block {
            BlockRef::Height(height) => self.block_hash_at(height)?,
            BlockRef::Hash(hash) => hash,
        };

        let decoded: bitcoin::Block = decode(&self.get_bytes(&format!("/block/{hash}/raw"))?)?;
        if decoded.block_hash() != hash {
            return Err(Error::Decode(format!("block {hash} hashes to {}", decoded.block_hash())));
        }

        let height = match block {
            BlockRef::Height(height) => height,
            BlockRef::Hash(_) => decoded
                .bip34_block_height()
                .ok()
                .and_then(|height| u32::try_from(height).ok())
                .ok_or_else(|| Error::Decode(format!("no BIP34 height in block {hash}")))?,
        };

        let mut previous = HashMap::new();
        let mut txdata = Vec::with_capacity(decoded.txdata.len());
        for transaction in decoded.txdata {
            let prevouts = if signal_bytes(&transaction).is_some() {
                self.fetch_previous(&transaction, &mut previous)?;
                spent_outputs(&transaction, &previous)?
            } else {
                Vec::new()
            };
            txdata.push(BlockTx::new(transaction, prevouts));
        }
        debug!(%hash, height, fetched = previous.len(), "decoded esplora block");

        let time = DateTime::from_timestamp(i64::from(decoded.header.time), 0)
            .ok_or_else(|| Error::Decode(format!("invalid timestamp in block {hash}")))?;
        let tip = self.get_block_count()?;

        Ok(Block {
            height,
            hash,
            time,
            confirmations: tip.saturating_sub(height) + 1,
            txdata,
        })
    }

    fn get_block_count(&self) -> Result<u32, Error> {
        self.get_text("/blocks/tip/height")?
            .trim()
            .parse::<u32>()
            .map_err(|err| Error::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EsploraConfig::for_network(Network::Mutinynet);
        assert_eq!(config.base_url, "https://mutinynet.com/api");
        assert_eq!(config.timeout_secs, 30);

        assert_eq!(EsploraConfig::new("http://localhost:3000/").base_url, "http://localhost:3000");
    }

    #[test]
    fn test_config_deserialize() {
        let config: EsploraConfig =
            serde_json::from_str(r#"{"baseUrl": "https://example.com/api"}"#).unwrap();
        assert_eq!(config.base_url, "https://example.com/api");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_spent_outputs() {
        use bitcoin::absolute::LockTime;
        use bitcoin::hashes::Hash as _;
        use bitcoin::transaction::Version;
        use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, TxIn, Witness};

        let output = |sats: u64| TxOut {
            value: Amount::from_sat(sats),
            script_pubkey: ScriptBuf::new(),
        };
        let input = |previous_output: OutPoint| TxIn {
            previous_output,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        };
        let transaction = |input: Vec<TxIn>, output: Vec<TxOut>| Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output,
        };

        let funding = transaction(
            vec![input(OutPoint::new(Txid::all_zeros(), 7))],
            vec![output(1_000), output(2_000)],
        );
        let funding_txid = funding.compute_txid();
        let previous = HashMap::from([(funding_txid, funding)]);

        let spend = transaction(
            vec![input(OutPoint::new(funding_txid, 1)), input(OutPoint::new(funding_txid, 0))],
            vec![output(2_500)],
        );
        assert_eq!(
            spent_outputs(&spend, &previous).unwrap(),
            [output(2_000), output(1_000)]
        );

        let dangling = transaction(vec![input(OutPoint::new(funding_txid, 2))], vec![]);
        assert!(matches!(spent_outputs(&dangling, &previous), Err(Error::Decode(_))));

        let coinbase = transaction(vec![input(OutPoint::null())], vec![output(50)]);
        assert!(spent_outputs(&coinbase, &HashMap::new()).unwrap().is_empty());
    }
}
