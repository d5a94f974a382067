use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{info, warn};

use crate::error::PeerError;
use crate::models::{Block, ChainResponse};
use crate::peers::NodeSet;
use crate::validator::validate_chain;

/// Where peer chains come from.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, PeerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Replaced,
    Authoritative,
}

/// Longest-valid-chain rule over the known peers.
#[derive(Clone)]
pub struct ConsensusResolver {
    source: Arc<dyn ChainSource>,
    timeout: Duration,
    difficulty: usize,
}

impl ConsensusResolver {
    pub fn new(source: Arc<dyn ChainSource>, timeout: Duration, difficulty: usize) -> Self {
        ConsensusResolver {
            source,
            timeout,
            difficulty,
        }
    }

    /// Returns the longest valid peer chain strictly longer than `local_len`.
    pub async fn best_candidate(&self, local_len: usize, peers: &NodeSet) -> Option<Vec<Block>> {
        let fetches = peers.iter().map(|peer| async move {
            let result = match tokio::time::timeout(self.timeout, self.source.fetch_chain(peer)).await {
                Ok(result) => result,
                Err(_) => Err(PeerError::TimedOut(peer.clone())),
            };
            (peer, result)
        });
        let responses = join_all(fetches).await;

        let mut max_length = local_len;
        let mut best = None;
        for (peer, response) in responses {
            let ChainResponse { chain, length } = match response {
                Ok(response) => response,
                Err(e) => {
                    warn!("skipping peer {}: {}", peer, e);
                    continue;
                }
            };
            if length <= max_length {
                continue;
            }
            if length != chain.len() {
                warn!(
                    "skipping peer {}: reported length {} but sent {} blocks",
                    peer,
                    length,
                    chain.len()
                );
                continue;
            }
            if let Err(e) = validate_chain(&chain, self.difficulty) {
                warn!("skipping peer {}: {}", peer, e);
                continue;
            }
            info!("peer {} offers a valid chain of length {}", peer, length);
            max_length = length;
            best = Some(chain);
        }
        best
    }
}
