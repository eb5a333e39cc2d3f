//! Resolution by scanning the chain for beacon signals.
//!
//! [`Traversal`] walks blocks from genesis up to a target height fixed before scanning starts. In
//! each block it collects the update payloads announced through the beacons of the current
//! document, keeps those that advance the version by one and fully verify against it (proof,
//! sourceHash and targetHash), and applies the one that remains. Rejected payloads are logged and
//! dropped. More than one distinct survivor in a block is a conflict the resolver cannot order,
//! and fails resolution.

use crate::beacon::BeaconSignal as _;
use crate::canonical_hash::Sha256Hash;
use crate::chain::{Block, BlockRef, ChainSource};
use crate::document::{Document, InitialDocument};
use crate::error::Btc1Error;
use crate::identifier::Did;
use crate::resolution::{
    DocumentMetadata, Resolution, ResolutionOptions, ResolutionStatus, SidecarData,
};
use crate::update::{self, DidUpdatePayload};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Cooperative cancellation, checked between blocks.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also trips once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            ..Self::default()
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// How the last block to scan is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetHeightPolicy {
    /// An explicit height
    BlockHeight(u32),
    /// The highest block with enough confirmations and a time at or before `version_time`
    /// (or now)
    Confirmations {
        required: u32,
        version_time: Option<DateTime<Utc>>,
    },
    /// The highest block with a time at or before the given time
    VersionTime(DateTime<Utc>),
    ChainTip,
}

impl From<&ResolutionOptions> for TargetHeightPolicy {
    fn from(options: &ResolutionOptions) -> Self {
        if let Some(height) = options.block_height {
            Self::BlockHeight(height)
        } else if let Some(required) = options.required_confirmations {
            Self::Confirmations {
                required,
                version_time: options.version_time,
            }
        } else if let Some(version_time) = options.version_time {
            Self::VersionTime(version_time)
        } else {
            Self::ChainTip
        }
    }
}

/// Height of the last block to scan. Never above the chain tip.
pub fn find_target_height<C>(chain: &C, policy: TargetHeightPolicy) -> Result<u32, Btc1Error>
where
    C: ChainSource + ?Sized,
{
    let tip = chain.get_block_count()?;

    let height = match policy {
        TargetHeightPolicy::BlockHeight(height) => height.min(tip),
        TargetHeightPolicy::ChainTip => tip,
        TargetHeightPolicy::VersionTime(version_time) => {
            // Highest block with time <= version_time. Block times are treated as monotonic.
            let (mut low, mut high) = (0, tip);
            while low < high {
                let mid = low + (high - low).div_ceil(2);
                if chain.get_block(BlockRef::Height(mid))?.time <= version_time {
                    low = mid;
                } else {
                    high = mid - 1;
                }
            }
            low
        }
        TargetHeightPolicy::Confirmations {
            required,
            version_time,
        } => {
            let bound = version_time.unwrap_or_else(Utc::now);
            let mut height = tip.saturating_sub(required.saturating_sub(1));
            loop {
                let block = chain.get_block(BlockRef::Height(height))?;
                if (block.confirmations >= required && block.time <= bound) || height == 0 {
                    break height;
                }
                height -= 1;
            }
        }
    };

    debug!(?policy, tip, height, "target block height");

    Ok(height)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraversalState {
    Initial,
    /// Next block to scan
    Scanning(u32),
    TargetReached,
    Deactivated,
    ChainTip,
    Cancelled,
}

impl TraversalState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Initial | Self::Scanning(_))
    }
}

/// State machine for Bitcoin blockchain traversal.
#[derive(Debug)]
pub struct Traversal<'a> {
    did: Did,
    contemporary_document: Document,
    contemporary_block_height: Option<u32>,
    current_version_id: u64,
    target_version_id: Option<u64>,
    target_block_height: u32,
    update_hash_history: Vec<Sha256Hash>,
    sidecar_data: Option<&'a SidecarData>,
    state: TraversalState,
}

impl<'a> Traversal<'a> {
    pub fn new(
        initial_document: InitialDocument,
        options: &'a ResolutionOptions,
        target_block_height: u32,
    ) -> Self {
        let contemporary_document = initial_document.into_document();

        Self {
            did: contemporary_document.did().clone(),
            contemporary_document,
            contemporary_block_height: None,
            current_version_id: 1,
            target_version_id: options.version_id,
            target_block_height,
            update_hash_history: Vec::new(),
            sidecar_data: options.sidecar_data.as_ref(),
            state: TraversalState::Initial,
        }
    }

    pub fn state(&self) -> &TraversalState {
        &self.state
    }

    pub fn current_version_id(&self) -> u64 {
        self.current_version_id
    }

    pub fn contemporary_document(&self) -> &Document {
        &self.contemporary_document
    }

    fn target_version_reached(&self) -> bool {
        self.target_version_id
            .is_some_and(|target| self.current_version_id >= target)
    }

    /// Advance by one block, or into a terminal state.
    pub fn step<C>(
        &mut self,
        chain: &C,
        cancel: &CancellationToken,
    ) -> Result<&TraversalState, Btc1Error>
    where
        C: ChainSource + ?Sized,
    {
        self.state = match self.state.clone() {
            TraversalState::Initial if self.target_version_reached() => {
                TraversalState::TargetReached
            }
            TraversalState::Initial => TraversalState::Scanning(0),
            TraversalState::Scanning(_) if cancel.is_cancelled() => TraversalState::Cancelled,
            TraversalState::Scanning(height) if height > self.target_block_height => {
                if self.target_version_id.is_some() {
                    TraversalState::ChainTip
                } else {
                    TraversalState::TargetReached
                }
            }
            TraversalState::Scanning(height) => {
                let block = chain.get_block(BlockRef::Height(height))?;
                self.process_block(&block)?;
                self.contemporary_block_height = Some(height);

                if self.contemporary_document.is_deactivated() {
                    TraversalState::Deactivated
                } else if self.target_version_reached() {
                    TraversalState::TargetReached
                } else {
                    TraversalState::Scanning(height + 1)
                }
            }
            terminal => terminal,
        };

        if self.state.is_terminal() {
            info!(
                did = %self.did,
                state = ?self.state,
                version_id = self.current_version_id,
                "traversal finished"
            );
        }

        Ok(&self.state)
    }

    /// Drive the traversal to a terminal state.
    pub fn run<C>(mut self, chain: &C, cancel: &CancellationToken) -> Result<Resolution, Btc1Error>
    where
        C: ChainSource + ?Sized,
    {
        while !self.step(chain, cancel)?.is_terminal() {}

        Ok(self.into_resolution())
    }

    fn process_block(&mut self, block: &Block) -> Result<(), Btc1Error> {
        debug!(height = block.height, txs = block.txdata.len(), "scanning block");

        let beacons = self.contemporary_document.beacons()?;
        let mut candidates: Vec<(DidUpdatePayload, Document)> = Vec::new();

        for tx in &block.txdata {
            for beacon in beacons.iter().filter(|beacon| beacon.is_spent_by(tx)) {
                let Some(candidate) = beacon.process_signal(tx, self.sidecar_data)? else {
                    continue;
                };

                let target_hash = candidate.target_hash();
                if self.update_hash_history.contains(&target_hash) {
                    debug!(%target_hash, "update already applied");
                    continue;
                }

                let verified = update::check_version(&candidate, self.current_version_id)
                    .and_then(|()| {
                        update::verify(&candidate, &self.did, &self.contemporary_document)
                    });
                let target_document = match verified {
                    Ok(target_document) => target_document,
                    Err(err) => {
                        warn!(
                            height = block.height,
                            beacon = beacon.id(),
                            %target_hash,
                            %err,
                            "rejecting update"
                        );
                        continue;
                    }
                };

                if candidates
                    .iter()
                    .any(|(existing, _)| existing.target_hash() == target_hash)
                {
                    debug!(%target_hash, "duplicate update in block");
                    continue;
                }

                debug!(height = block.height, %target_hash, "update candidate");
                candidates.push((candidate, target_document));
            }
        }

        if candidates.len() > 1 {
            return Err(Btc1Error::LateConflictError(format!(
                "{} conflicting updates to version {} in block {}",
                candidates.len(),
                self.current_version_id + 1,
                block.height
            )));
        }
        let Some((accepted, target_document)) = candidates.pop() else {
            return Ok(());
        };

        self.contemporary_document = target_document;
        self.current_version_id = accepted.target_version_id();
        self.update_hash_history.push(accepted.target_hash());

        info!(
            height = block.height,
            version_id = self.current_version_id,
            "applied update"
        );

        Ok(())
    }

    fn into_resolution(self) -> Resolution {
        let status = match self.state {
            TraversalState::Deactivated => ResolutionStatus::Deactivated,
            TraversalState::ChainTip => ResolutionStatus::ChainTip,
            TraversalState::Cancelled => ResolutionStatus::Cancelled,
            _ => ResolutionStatus::TargetReached,
        };

        Resolution {
            did_document_metadata: DocumentMetadata {
                version_id: self.current_version_id,
                deactivated: self.contemporary_document.is_deactivated(),
                update_hash_history: self.update_hash_history,
                block_height: self.contemporary_block_height,
                target_block_height: self.target_block_height,
                status,
            },
            did_document: self.contemporary_document,
        }
    }
}

/// Resolve `did` against `chain`.
#[instrument(skip(options, chain, cancel), fields(did = %did))]
pub fn resolve<C>(
    did: &Did,
    options: &ResolutionOptions,
    chain: &C,
    cancel: &CancellationToken,
) -> Result<Resolution, Btc1Error>
where
    C: ChainSource + ?Sized,
{
    let network = did.components().network();
    if let Some(requested) = options.network {
        if requested != network {
            return Err(Btc1Error::InvalidDid(format!(
                "`{did}` is a {network} identifier, but {requested} was requested"
            )));
        }
    }

    if options.version_id == Some(0) {
        return Err(Btc1Error::InvalidDid("versionId starts at 1".to_string()));
    }

    if let Some(sidecar_did) = options.sidecar_data.as_ref().and_then(|data| data.did.as_ref()) {
        if sidecar_did.parse::<Did>().ok().as_ref() != Some(did) {
            return Err(Btc1Error::InvalidSidecarData(format!(
                "sidecar data is for `{sidecar_did}`"
            )));
        }
    }

    let initial_document = InitialDocument::from_did(did, options)?;
    let target_block_height = find_target_height(chain, TargetHeightPolicy::from(options))?;

    Traversal::new(initial_document, options, target_block_height).run(chain, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::{Beacon, BeaconSignal as _};
    use crate::canonical_hash::CanonicalHash as _;
    use crate::chain::{BlockTx, MemoryChain};
    use crate::cryptosuite::Cryptosuite;
    use crate::document;
    use crate::identifier::{DidVersion, Network};
    use crate::key::{Multikey, SecretKey};
    use crate::resolution::SignalMetadata;
    use bitcoin::hashes::Hash as _;
    use bitcoin::{Amount, OutPoint, TxOut, Txid};
    use chrono::TimeZone as _;
    use json_patch::Patch;
    use serde_json::json;
    use std::sync::Mutex;

    fn block_interval() -> chrono::Duration {
        chrono::Duration::minutes(10)
    }

    struct Fixture {
        did: Did,
        initial: Document,
        chain: MemoryChain,
        sidecar: SidecarData,
    }

    impl Fixture {
        fn new() -> Self {
            let public_key = secret_key().public_key(&secp256k1::Secp256k1::signing_only());
            let (did, initial) =
                document::create_deterministic(public_key, Network::Regtest, DidVersion::One)
                    .unwrap();

            Self {
                did,
                initial: initial.into_document(),
                chain: MemoryChain::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
                sidecar: SidecarData::default(),
            }
        }

        fn signer(&self) -> Multikey {
            Multikey::from_secret_key(
                format!("{}#initialKey", self.did),
                self.did.to_string(),
                secret_key(),
            )
        }

        fn beacon(&self, index: usize) -> Beacon {
            self.initial.beacons().unwrap().remove(index)
        }

        /// A signal for `payload` from `beacon`, recorded in the sidecar.
        fn signal(&mut self, beacon: &Beacon, payload: &DidUpdatePayload) -> BlockTx {
            let vout = self.sidecar.signals_metadata.len() as u32;
            let funding = OutPoint::new(Txid::all_zeros(), vout);
            let transaction = beacon.generate_signal(payload, funding).unwrap();
            let prevout = TxOut {
                value: Amount::from_sat(50_000),
                script_pubkey: beacon.address().script_pubkey(),
            };

            self.sidecar.signals_metadata.insert(
                transaction.compute_txid(),
                SignalMetadata {
                    update_payload: payload.json().clone(),
                },
            );

            BlockTx::new(transaction, vec![prevout])
        }

        fn mine(&mut self, txdata: Vec<BlockTx>) -> u32 {
            let time = self.chain.tip_time() + block_interval();
            self.chain.push_block(time, txdata)
        }

        fn options(&self) -> ResolutionOptions {
            ResolutionOptions {
                sidecar_data: Some(self.sidecar.clone()),
                ..Default::default()
            }
        }

        fn resolve(&self, options: &ResolutionOptions) -> Result<Resolution, Btc1Error> {
            resolve(&self.did, options, &self.chain, &CancellationToken::new())
        }
    }

    fn secret_key() -> SecretKey {
        SecretKey::from_slice(&[0x01; 32]).unwrap()
    }

    fn add_service(fragment: &str) -> Patch {
        serde_json::from_value(json!([{
            "op": "add",
            "path": "/service/-",
            "value": {
                "id": format!("#{fragment}"),
                "type": "LinkedDomains",
                "serviceEndpoint": format!("https://{fragment}.example.com"),
            },
        }]))
        .unwrap()
    }

    fn update(
        source: &Document,
        version_id: u64,
        fragment: &str,
        signer: &Multikey,
    ) -> DidUpdatePayload {
        update::prepare_update(
            source,
            version_id,
            add_service(fragment),
            signer,
            Cryptosuite::Bip340Jcs2025,
        )
        .unwrap()
    }

    /// `payload` re-signed by `signer` after its targetHash was replaced by `target_hash`.
    fn with_target_hash(
        payload: &DidUpdatePayload,
        target_hash: Sha256Hash,
        did: &Did,
        signer: &Multikey,
    ) -> DidUpdatePayload {
        let mut json = payload.unsigned();
        json["targetHash"] = json!(target_hash.to_multibase());
        let unsigned = DidUpdatePayload::from_json_value(json).unwrap();

        update::invoke(&unsigned, did, signer, Cryptosuite::Bip340Jcs2025).unwrap()
    }

    /// Serves blocks from `inner` but fails at `fail_at`, recording every requested height.
    struct FailingChain {
        inner: MemoryChain,
        fail_at: u32,
        requested: Mutex<Vec<u32>>,
    }

    impl ChainSource for FailingChain {
        fn get_block(&self, block: BlockRef) -> Result<Block, crate::chain::Error> {
            if let BlockRef::Height(height) = block {
                self.requested.lock().unwrap().push(height);
                if height == self.fail_at {
                    return Err(crate::chain::Error::Unavailable("connection reset".into()));
                }
            }

            self.inner.get_block(block)
        }

        fn get_block_count(&self) -> Result<u32, crate::chain::Error> {
            self.inner.get_block_count()
        }
    }

    #[test]
    fn test_no_updates() {
        let mut fixture = Fixture::new();
        fixture.chain.push_empty_blocks(5, block_interval());

        let resolution = fixture.resolve(&ResolutionOptions::default()).unwrap();
        assert_eq!(resolution.did_document, fixture.initial);

        let metadata = resolution.did_document_metadata;
        assert_eq!(metadata.version_id, 1);
        assert_eq!(metadata.status, ResolutionStatus::TargetReached);
        assert_eq!(metadata.block_height, Some(5));
        assert!(metadata.update_hash_history.is_empty());
        assert!(!metadata.deactivated);
    }

    #[test]
    fn test_sequential_updates() {
        let mut fixture = Fixture::new();
        let signer = fixture.signer();

        let first = update(&fixture.initial, 1, "first", &signer);
        let second_source = update::apply(&first, &fixture.initial).unwrap();
        let second = update(&second_source, 2, "second", &signer);

        let tx = fixture.signal(&fixture.beacon(0), &first);
        fixture.mine(vec![tx]);
        fixture.chain.push_empty_blocks(2, block_interval());
        // Announced through a different beacon of the same document.
        let tx = fixture.signal(&fixture.beacon(2), &second);
        fixture.mine(vec![tx]);

        let resolution = fixture.resolve(&fixture.options()).unwrap();
        let metadata = &resolution.did_document_metadata;
        assert_eq!(metadata.version_id, 3);
        assert_eq!(
            metadata.update_hash_history,
            [first.target_hash(), second.target_hash()]
        );
        assert_eq!(resolution.did_document.hash(), second.target_hash());
        assert_eq!(resolution.did_document.services().len(), 5);
    }

    #[test]
    fn test_stops_at_version_id() {
        let mut fixture = Fixture::new();
        let signer = fixture.signer();

        let first = update(&fixture.initial, 1, "first", &signer);
        let second_source = update::apply(&first, &fixture.initial).unwrap();
        let second = update(&second_source, 2, "second", &signer);

        let tx = fixture.signal(&fixture.beacon(0), &first);
        let first_height = fixture.mine(vec![tx]);
        let tx = fixture.signal(&fixture.beacon(0), &second);
        fixture.mine(vec![tx]);

        let options = ResolutionOptions {
            version_id: Some(2),
            ..fixture.options()
        };
        let resolution = fixture.resolve(&options).unwrap();
        assert_eq!(resolution.did_document, second_source);
        assert_eq!(resolution.did_document_metadata.block_height, Some(first_height));
        assert_eq!(
            resolution.did_document_metadata.status,
            ResolutionStatus::TargetReached
        );

        let options = ResolutionOptions {
            version_id: Some(7),
            ..fixture.options()
        };
        let resolution = fixture.resolve(&options).unwrap();
        assert_eq!(resolution.did_document_metadata.version_id, 3);
        assert_eq!(resolution.did_document_metadata.status, ResolutionStatus::ChainTip);
    }

    #[test]
    fn test_block_height_excludes_later_updates() {
        let mut fixture = Fixture::new();
        let first = update(&fixture.initial, 1, "first", &fixture.signer());
        fixture.chain.push_empty_blocks(3, block_interval());
        let tx = fixture.signal(&fixture.beacon(1), &first);
        fixture.mine(vec![tx]);

        let options = ResolutionOptions {
            block_height: Some(3),
            ..fixture.options()
        };
        let resolution = fixture.resolve(&options).unwrap();
        assert_eq!(resolution.did_document_metadata.version_id, 1);
        assert_eq!(resolution.did_document_metadata.target_block_height, 3);
        assert_eq!(resolution.did_document_metadata.block_height, Some(3));
    }

    #[test]
    fn test_conflicting_updates_in_one_block() {
        let mut fixture = Fixture::new();
        let signer = fixture.signer();
        let left = update(&fixture.initial, 1, "left", &signer);
        let right = update(&fixture.initial, 1, "right", &signer);

        let txdata = vec![
            fixture.signal(&fixture.beacon(0), &left),
            fixture.signal(&fixture.beacon(1), &right),
        ];
        fixture.mine(txdata);

        assert!(matches!(
            fixture.resolve(&fixture.options()),
            Err(Btc1Error::LateConflictError(_))
        ));
    }

    #[test]
    fn test_same_update_through_two_beacons() {
        let mut fixture = Fixture::new();
        let first = update(&fixture.initial, 1, "first", &fixture.signer());

        let txdata = vec![
            fixture.signal(&fixture.beacon(0), &first),
            fixture.signal(&fixture.beacon(1), &first),
        ];
        fixture.mine(txdata);

        let resolution = fixture.resolve(&fixture.options()).unwrap();
        assert_eq!(resolution.did_document_metadata.version_id, 2);
        assert_eq!(
            resolution.did_document_metadata.update_hash_history,
            [first.target_hash()]
        );
    }

    #[test]
    fn test_wrong_target_hash_is_skipped() {
        let mut fixture = Fixture::new();
        let signer = fixture.signer();
        let valid = update(&fixture.initial, 1, "valid", &signer);
        let other = update(&fixture.initial, 1, "other", &signer);
        let forged = with_target_hash(&valid, other.target_hash(), &fixture.did, &signer);
        assert!(update::authorize(&forged, &fixture.did, &fixture.initial).is_ok());

        let tx = fixture.signal(&fixture.beacon(0), &forged);
        fixture.mine(vec![tx]);

        let resolution = fixture.resolve(&fixture.options()).unwrap();
        assert_eq!(resolution.did_document_metadata.version_id, 1);
        assert!(resolution.did_document_metadata.update_hash_history.is_empty());
        assert_eq!(resolution.did_document, fixture.initial);
    }

    #[test]
    fn test_wrong_target_hash_does_not_conflict() {
        let mut fixture = Fixture::new();
        let signer = fixture.signer();
        let valid = update(&fixture.initial, 1, "valid", &signer);
        let other = update(&fixture.initial, 1, "other", &signer);
        let forged = with_target_hash(&other, valid.target_hash(), &fixture.did, &signer);

        let txdata = vec![
            fixture.signal(&fixture.beacon(0), &forged),
            fixture.signal(&fixture.beacon(1), &valid),
        ];
        fixture.mine(txdata);

        let resolution = fixture.resolve(&fixture.options()).unwrap();
        assert_eq!(resolution.did_document_metadata.version_id, 2);
        assert_eq!(
            resolution.did_document_metadata.update_hash_history,
            [valid.target_hash()]
        );
        assert_eq!(resolution.did_document.hash(), valid.target_hash());
    }

    #[test]
    fn test_unknown_beacon_type_fails_resolution() {
        let mut fixture = Fixture::new();
        let patch = serde_json::from_value(json!([{
            "op": "add",
            "path": "/service/-",
            "value": {
                "id": "#foo",
                "type": "FooBeacon",
                "serviceEndpoint": "bitcoin:mh8h6FXkMzHaW4RKerGT33ZLqx52xL28dU",
            },
        }]))
        .unwrap();
        let first = update::prepare_update(
            &fixture.initial,
            1,
            patch,
            &fixture.signer(),
            Cryptosuite::Bip340Jcs2025,
        )
        .unwrap();

        let tx = fixture.signal(&fixture.beacon(0), &first);
        fixture.mine(vec![tx]);
        fixture.chain.push_empty_blocks(1, block_interval());

        assert!(matches!(
            fixture.resolve(&fixture.options()),
            Err(Btc1Error::InvalidBeaconType(_))
        ));
    }

    #[test]
    fn test_chain_failure_stops_traversal() {
        let mut fixture = Fixture::new();
        fixture.chain.push_empty_blocks(6, block_interval());
        let chain = FailingChain {
            inner: fixture.chain.clone(),
            fail_at: 3,
            requested: Mutex::new(Vec::new()),
        };

        let result = resolve(
            &fixture.did,
            &ResolutionOptions::default(),
            &chain,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(Btc1Error::ChainSourceUnavailable(_))));
        assert_eq!(*chain.requested.lock().unwrap(), [0, 1, 2, 3]);
    }

    #[test]
    fn test_deactivation_stops_traversal() {
        let mut fixture = Fixture::new();
        let deactivation = update::prepare_deactivation(
            &fixture.initial,
            1,
            &fixture.signer(),
            Cryptosuite::Bip340Rdfc2025,
        )
        .unwrap();

        let tx = fixture.signal(&fixture.beacon(2), &deactivation);
        let height = fixture.mine(vec![tx]);
        fixture.chain.push_empty_blocks(10, block_interval());

        let resolution = fixture.resolve(&fixture.options()).unwrap();
        let metadata = resolution.did_document_metadata;
        assert!(metadata.deactivated);
        assert_eq!(metadata.status, ResolutionStatus::Deactivated);
        assert_eq!(metadata.block_height, Some(height));
        assert_eq!(metadata.version_id, 2);
    }

    #[test]
    fn test_signal_without_sidecar_is_ignored() {
        let mut fixture = Fixture::new();
        let first = update(&fixture.initial, 1, "first", &fixture.signer());
        let tx = fixture.signal(&fixture.beacon(0), &first);
        fixture.mine(vec![tx]);

        let resolution = fixture.resolve(&ResolutionOptions::default()).unwrap();
        assert_eq!(resolution.did_document_metadata.version_id, 1);
        assert_eq!(resolution.did_document, fixture.initial);
    }

    #[test]
    fn test_unauthorized_update_is_skipped() {
        let mut fixture = Fixture::new();
        let intruder = Multikey::from_secret_key(
            format!("{}#initialKey", fixture.did),
            fixture.did.to_string(),
            SecretKey::from_slice(&[0x02; 32]).unwrap(),
        );
        let forged = update(&fixture.initial, 1, "forged", &intruder);
        let tx = fixture.signal(&fixture.beacon(0), &forged);
        fixture.mine(vec![tx]);

        let resolution = fixture.resolve(&fixture.options()).unwrap();
        assert_eq!(resolution.did_document_metadata.version_id, 1);
    }

    #[test]
    fn test_out_of_order_version_is_skipped() {
        let mut fixture = Fixture::new();
        let skipped = update(&fixture.initial, 2, "skipped", &fixture.signer());
        let tx = fixture.signal(&fixture.beacon(0), &skipped);
        fixture.mine(vec![tx]);

        let resolution = fixture.resolve(&fixture.options()).unwrap();
        assert_eq!(resolution.did_document_metadata.version_id, 1);
    }

    #[test]
    fn test_cancellation() {
        let mut fixture = Fixture::new();
        fixture.chain.push_empty_blocks(3, block_interval());
        let options = ResolutionOptions::default();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let resolution = resolve(&fixture.did, &options, &fixture.chain, &cancel).unwrap();
        assert_eq!(resolution.did_document_metadata.status, ResolutionStatus::Cancelled);
        assert_eq!(resolution.did_document_metadata.block_height, None);

        let expired = CancellationToken::with_timeout(Duration::ZERO);
        assert!(expired.is_cancelled());
    }

    #[test]
    fn test_step_through_states() {
        let mut fixture = Fixture::new();
        fixture.chain.push_empty_blocks(1, block_interval());
        let options = ResolutionOptions::default();
        let initial = InitialDocument::from_did(&fixture.did, &options).unwrap();
        let cancel = CancellationToken::new();

        let mut traversal = Traversal::new(initial, &options, 1);
        assert_eq!(traversal.state(), &TraversalState::Initial);
        assert_eq!(traversal.step(&fixture.chain, &cancel).unwrap(), &TraversalState::Scanning(0));
        assert_eq!(traversal.step(&fixture.chain, &cancel).unwrap(), &TraversalState::Scanning(1));
        assert_eq!(traversal.step(&fixture.chain, &cancel).unwrap(), &TraversalState::Scanning(2));
        assert_eq!(
            traversal.step(&fixture.chain, &cancel).unwrap(),
            &TraversalState::TargetReached
        );
        assert_eq!(traversal.current_version_id(), 1);
    }

    #[test]
    fn test_target_height_policies() {
        let mut chain = MemoryChain::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        chain.push_empty_blocks(199, block_interval());
        let genesis_time = chain.get_block(BlockRef::Height(0)).unwrap().time;

        // Five minutes after block 171 was mined.
        let version_time = genesis_time + block_interval() * 171 + chrono::Duration::minutes(5);
        let by_time =
            find_target_height(&chain, TargetHeightPolicy::VersionTime(version_time)).unwrap();
        assert_eq!(by_time, 171);

        let by_depth = find_target_height(
            &chain,
            TargetHeightPolicy::Confirmations {
                required: 29,
                version_time: None,
            },
        )
        .unwrap();
        assert_eq!(by_depth, by_time);

        let bounded = find_target_height(
            &chain,
            TargetHeightPolicy::Confirmations {
                required: 6,
                version_time: Some(version_time),
            },
        )
        .unwrap();
        assert_eq!(bounded, 171);

        let before_genesis = genesis_time - chrono::Duration::days(1);
        assert_eq!(
            find_target_height(&chain, TargetHeightPolicy::VersionTime(before_genesis)).unwrap(),
            0
        );
        assert_eq!(
            find_target_height(&chain, TargetHeightPolicy::BlockHeight(1_000)).unwrap(),
            199
        );
    }

    #[test]
    fn test_policy_precedence() {
        let time = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let options = ResolutionOptions {
            version_time: Some(time),
            required_confirmations: Some(6),
            ..Default::default()
        };
        assert_eq!(
            TargetHeightPolicy::from(&options),
            TargetHeightPolicy::Confirmations {
                required: 6,
                version_time: Some(time),
            }
        );

        let options = ResolutionOptions {
            block_height: Some(10),
            ..options
        };
        assert_eq!(TargetHeightPolicy::from(&options), TargetHeightPolicy::BlockHeight(10));
        assert_eq!(
            TargetHeightPolicy::from(&ResolutionOptions::default()),
            TargetHeightPolicy::ChainTip
        );
    }

    #[test]
    fn test_rejected_options() {
        let fixture = Fixture::new();

        let options = ResolutionOptions {
            network: Some(Network::Mainnet),
            ..Default::default()
        };
        assert!(matches!(fixture.resolve(&options), Err(Btc1Error::InvalidDid(_))));

        let options = ResolutionOptions {
            version_id: Some(0),
            ..Default::default()
        };
        assert!(matches!(fixture.resolve(&options), Err(Btc1Error::InvalidDid(_))));

        let options = ResolutionOptions {
            sidecar_data: Some(SidecarData {
                did: Some("did:btc1:k1example".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            fixture.resolve(&options),
            Err(Btc1Error::InvalidSidecarData(_))
        ));
    }
}
