//! Read-only access to the blocks a resolver scans.

use bitcoin::hashes::{Hash as _, sha256d};
use bitcoin::{BlockHash, Transaction, TxOut};
use chrono::{DateTime, Duration, Utc};
use onlyerror::Error;
use std::fmt;

#[cfg(feature = "esplora")]
pub mod esplora;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Requested block does not exist
    #[error("Block {0} not found")]
    BlockNotFound(String),

    /// The chain source could not be reached
    #[error("Chain source unavailable: {0}")]
    Unavailable(String),

    /// The chain source returned data that could not be decoded
    #[error("Failed to decode chain data: {0}")]
    Decode(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockRef {
    Height(u32),
    Hash(BlockHash),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Height(height) => write!(f, "at height {height}"),
            Self::Hash(hash) => write!(f, "{hash}"),
        }
    }
}

/// A transaction together with the outputs its inputs spend, in input order.
///
/// A source may leave `prevouts` empty for a transaction with no beacon signal output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTx {
    pub transaction: Transaction,
    pub prevouts: Vec<TxOut>,
}

impl BlockTx {
    pub fn new(transaction: Transaction, prevouts: Vec<TxOut>) -> Self {
        Self {
            transaction,
            prevouts,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub height: u32,
    pub hash: BlockHash,
    pub time: DateTime<Utc>,
    /// Depth below and including the chain tip at the time of retrieval
    pub confirmations: u32,
    pub txdata: Vec<BlockTx>,
}

/// A source of blocks. Shared read-only between concurrent resolutions.
pub trait ChainSource: Sync {
    fn get_block(&self, block: BlockRef) -> Result<Block, Error>;

    /// Height of the chain tip.
    fn get_block_count(&self) -> Result<u32, Error>;
}

#[derive(Clone, Debug)]
struct StoredBlock {
    hash: BlockHash,
    time: DateTime<Utc>,
    txdata: Vec<BlockTx>,
}

/// An in-memory chain, for tests and offline replay of recorded blocks.
#[derive(Clone, Debug)]
pub struct MemoryChain {
    blocks: Vec<StoredBlock>,
}

impl MemoryChain {
    /// A chain holding only an empty genesis block.
    pub fn new(genesis_time: DateTime<Utc>) -> Self {
        let mut chain = Self { blocks: Vec::new() };
        chain.push_block(genesis_time, Vec::new());

        chain
    }

    /// Append a block and return its height.
    pub fn push_block(&mut self, time: DateTime<Utc>, txdata: Vec<BlockTx>) -> u32 {
        let height = self.blocks.len() as u32;
        let previous = self.blocks.last().map(|block| block.hash);

        let mut preimage = Vec::new();
        if let Some(previous) = previous {
            preimage.extend_from_slice(previous.as_byte_array());
        }
        preimage.extend_from_slice(&height.to_le_bytes());
        preimage.extend_from_slice(&time.timestamp().to_le_bytes());
        for tx in &txdata {
            preimage.extend_from_slice(tx.transaction.compute_txid().as_byte_array());
        }
        let hash = BlockHash::from_byte_array(sha256d::Hash::hash(&preimage).to_byte_array());

        self.blocks.push(StoredBlock { hash, time, txdata });

        height
    }

    /// Append `count` empty blocks spaced `interval` apart.
    pub fn push_empty_blocks(&mut self, count: u32, interval: Duration) {
        for _ in 0..count {
            let time = self.tip_time() + interval;
            self.push_block(time, Vec::new());
        }
    }

    pub fn tip_height(&self) -> u32 {
        self.blocks.len() as u32 - 1
    }

    pub fn tip_time(&self) -> DateTime<Utc> {
        self.blocks[self.blocks.len() - 1].time
    }
}

impl ChainSource for MemoryChain {
    fn get_block(&self, block: BlockRef) -> Result<Block, Error> {
        let height = match block {
            BlockRef::Height(height) => height as usize,
            BlockRef::Hash(hash) => self
                .blocks
                .iter()
                .position(|stored| stored.hash == hash)
                .ok_or_else(|| Error::BlockNotFound(block.to_string()))?,
        };

        let stored = self
            .blocks
            .get(height)
            .ok_or_else(|| Error::BlockNotFound(block.to_string()))?;

        Ok(Block {
            height: height as u32,
            hash: stored.hash,
            time: stored.time,
            confirmations: self.tip_height() - height as u32 + 1,
            txdata: stored.txdata.clone(),
        })
    }

    fn get_block_count(&self) -> Result<u32, Error> {
        Ok(self.tip_height())
    }
}
