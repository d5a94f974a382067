use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use crate::error::LedgerError;
use crate::miner::{self, CancelFlag};
use crate::models::{Block, Vote};
use crate::validator::validate_block;

pub const VOTES_PER_BLOCK: usize = 4;
pub const DEFAULT_DIFFICULTY: usize = 4;
pub const GENESIS_PREVIOUS_HASH: &str = "1";
pub const GENESIS_NONCE: u64 = 100;

/// Smallest step used to keep block timestamps strictly increasing.
const MIN_TIMESTAMP_STEP: f64 = 0.001;

/// The chain of one node together with the votes waiting for a block.
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    pending: VecDeque<Vote>,
    difficulty: usize,
}

impl Ledger {
    /// Creates a ledger holding a freshly mined genesis block.
    pub fn new(difficulty: usize) -> Result<Self, LedgerError> {
        Self::with_cancel(difficulty, &CancelFlag::new())
    }

    pub fn with_cancel(difficulty: usize, cancel: &CancelFlag) -> Result<Self, LedgerError> {
        let skeleton = Block {
            index: 1,
            timestamp: now(),
            votes: vec![],
            nonce: GENESIS_NONCE,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        };
        let genesis = miner::mine(skeleton, difficulty, cancel)?;
        info!("genesis block created, hash {}", genesis.hash());
        Ok(Ledger {
            chain: vec![genesis],
            pending: VecDeque::new(),
            difficulty,
        })
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn head(&self) -> Result<&Block, LedgerError> {
        self.chain.last().ok_or(LedgerError::EmptyChain)
    }

    pub fn pending(&self) -> &VecDeque<Vote> {
        &self.pending
    }

    /// Appends an already admitted vote to the back of the pool.
    pub fn enqueue(&mut self, vote: Vote) {
        self.pending.push_back(vote);
    }

    /// True if `signed_hash` sits in the pool or in any block.
    pub fn contains_signed_hash(&self, signed_hash: &str) -> bool {
        self.pending.iter().any(|v| v.signed_hash == signed_hash)
            || self
                .chain
                .iter()
                .flat_map(|b| b.votes.iter())
                .any(|v| v.signed_hash == signed_hash)
    }

    /// Unmined successor of the head carrying the oldest four pending votes.
    pub fn template(&self) -> Result<Block, LedgerError> {
        if self.pending.len() < VOTES_PER_BLOCK {
            return Err(LedgerError::InsufficientVotes {
                pending: self.pending.len(),
                required: VOTES_PER_BLOCK,
            });
        }
        let head = self.head()?;
        Ok(Block {
            index: head.index + 1,
            timestamp: now().max(head.timestamp + MIN_TIMESTAMP_STEP),
            votes: self.pending.iter().take(VOTES_PER_BLOCK).cloned().collect(),
            nonce: 0,
            previous_hash: head.hash(),
        })
    }

    /// Appends a mined template and drains the votes it carries.
    pub fn commit(&mut self, block: Block) -> Result<&Block, LedgerError> {
        let head = self.head()?;
        let batch_matches = block.votes.len() == VOTES_PER_BLOCK
            && block.votes.iter().eq(self.pending.iter().take(VOTES_PER_BLOCK));
        if block.index != head.index + 1 || !batch_matches {
            return Err(LedgerError::StaleTemplate);
        }
        validate_block(&block, head, self.difficulty).map_err(|fault| {
            crate::error::ValidationError {
                position: self.chain.len(),
                fault,
            }
        })?;

        self.pending.drain(..VOTES_PER_BLOCK);
        self.chain.push(block);
        self.head()
    }

    /// Mines the next block on the calling thread.
    pub fn mine_next(&mut self) -> Result<Block, LedgerError> {
        let template = self.template()?;
        let block = miner::mine(template, self.difficulty, &CancelFlag::new())?;
        self.commit(block).cloned()
    }

    /// Swaps in a chain picked by consensus resolution. The pool is untouched.
    pub fn replace_chain(&mut self, chain: Vec<Block>) {
        self.chain = chain;
    }
}

pub(crate) fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
