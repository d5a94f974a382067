use std::sync::Arc;

use log::{info, warn};
use tokio::sync::{Mutex, RwLock};

use crate::admission::{self, AdmissionPolicy};
use crate::config::NodeConfig;
use crate::consensus::{ChainSource, ConsensusResolver, Resolution};
use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::miner::{self, CancelFlag};
use crate::models::{Block, VoteSubmission};
use crate::peers::NodeSet;

/// Outcome of a resolution round, as reported by `/nodes/resolve`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolveReport {
    pub resolution: Resolution,
    pub length: usize,
    pub head_timestamp: f64,
}

/// A ledger replica shared between request handlers.
///
/// Reads and vote admission only touch the `ledger` lock. Mining and chain
/// replacement additionally hold `write_permit` for their whole duration, so
/// a replacement can never land in the middle of a nonce search.
pub struct LedgerNode {
    ledger: RwLock<Ledger>,
    peers: RwLock<NodeSet>,
    write_permit: Mutex<()>,
    resolver: ConsensusResolver,
    policy: AdmissionPolicy,
    cancel: CancelFlag,
}

impl LedgerNode {
    /// Mines genesis and seeds the peer set from `config`.
    pub fn new(config: &NodeConfig, source: Arc<dyn ChainSource>) -> Result<Self, LedgerError> {
        let cancel = CancelFlag::new();
        let ledger = Ledger::with_cancel(config.difficulty, &cancel)?;
        let peers = NodeSet::from_addresses(&config.peers)?;
        Ok(LedgerNode {
            ledger: RwLock::new(ledger),
            peers: RwLock::new(peers),
            write_permit: Mutex::new(()),
            resolver: ConsensusResolver::new(source, config.peer_timeout, config.difficulty),
            policy: AdmissionPolicy {
                reject_duplicates: config.reject_duplicates,
            },
            cancel,
        })
    }

    pub async fn chain(&self) -> Vec<Block> {
        self.ledger.read().await.chain().to_vec()
    }

    pub async fn pending_len(&self) -> usize {
        self.ledger.read().await.pending().len()
    }

    pub async fn admit(&self, submission: VoteSubmission) -> Result<u64, LedgerError> {
        let mut ledger = self.ledger.write().await;
        admission::admit(&mut ledger, submission, self.policy)
    }

    /// Forges the next block. The nonce search runs on the blocking pool.
    pub async fn mine(&self) -> Result<Block, LedgerError> {
        let _permit = self.write_permit.lock().await;
        let (template, difficulty) = {
            let ledger = self.ledger.read().await;
            (ledger.template()?, ledger.difficulty())
        };

        let cancel = self.cancel.clone();
        let mined = tokio::task::spawn_blocking(move || miner::mine(template, difficulty, &cancel))
            .await
            .map_err(|e| LedgerError::MinerTask(e.to_string()))??;

        let mut ledger = self.ledger.write().await;
        let block = ledger.commit(mined)?.clone();
        info!(
            "forged block {} with {} votes, hash {}",
            block.index,
            block.votes.len(),
            block.hash()
        );
        Ok(block)
    }

    pub async fn register_peers(&self, addresses: &[String]) -> Result<Vec<String>, LedgerError> {
        let mut peers = self.peers.write().await;
        for node in peers.register_all(addresses)? {
            info!("registered peer {}", node);
        }
        Ok(peers.to_vec())
    }

    pub async fn peers(&self) -> Vec<String> {
        self.peers.read().await.to_vec()
    }

    /// Runs consensus resolution against every known peer.
    pub async fn resolve(&self) -> Result<ResolveReport, LedgerError> {
        let _permit = self.write_permit.lock().await;
        let peers = self.peers.read().await.clone();
        let local_len = self.ledger.read().await.len();

        let candidate = self.resolver.best_candidate(local_len, &peers).await;

        let mut ledger = self.ledger.write().await;
        let resolution = match candidate {
            Some(chain) => {
                info!("replacing local chain ({} blocks) with {} blocks", ledger.len(), chain.len());
                ledger.replace_chain(chain);
                Resolution::Replaced
            }
            None => Resolution::Authoritative,
        };
        let head_timestamp = ledger.head()?.timestamp;
        Ok(ResolveReport {
            resolution,
            length: ledger.len(),
            head_timestamp,
        })
    }

    /// Stops any running nonce search.
    pub fn shutdown(&self) {
        warn!("ledger node shutting down, cancelling mining");
        self.cancel.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
