use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::codec::{meets_difficulty, BlockPreimage};
use crate::error::LedgerError;
use crate::models::Block;

/// Attempts between two looks at the cancellation flag.
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// Shared flag used to stop a running nonce search.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub nonce: u64,
    pub hash: String,
    pub attempts: u64,
}

/// Walks nonces upward from `start` until the digest meets `difficulty`.
pub fn search(
    preimage: &BlockPreimage,
    start: u64,
    difficulty: usize,
    cancel: &CancelFlag,
) -> Result<Solution, LedgerError> {
    let mut attempts = 0u64;
    for nonce in start..=u64::MAX {
        let hash = preimage.digest(nonce);
        attempts += 1;
        if meets_difficulty(&hash, difficulty) {
            return Ok(Solution {
                nonce,
                hash,
                attempts,
            });
        }
        if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(LedgerError::MiningCancelled);
        }
    }
    Err(LedgerError::NonceSpaceExhausted)
}

/// Mines `block`, using its current nonce as the starting point.
pub fn mine(mut block: Block, difficulty: usize, cancel: &CancelFlag) -> Result<Block, LedgerError> {
    let preimage = BlockPreimage::new(&block);
    let solution = search(&preimage, block.nonce, difficulty, cancel)?;
    debug!(
        "block {} sealed with nonce {} after {} attempts",
        block.index, solution.nonce, solution.attempts
    );
    block.nonce = solution.nonce;
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skeleton() -> Block {
        Block {
            index: 3,
            timestamp: 1700000123.5,
            votes: vec![],
            nonce: 0,
            previous_hash: "00c0ffee".to_string(),
        }
    }

    #[test]
    fn mined_block_meets_difficulty() {
        let block = mine(skeleton(), 3, &CancelFlag::new()).unwrap();
        assert!(block.hash().starts_with("000"));
    }

    #[test]
    fn search_starts_at_the_given_nonce() {
        let preimage = BlockPreimage::new(&skeleton());
        let first = search(&preimage, 0, 2, &CancelFlag::new()).unwrap();
        let again = search(&preimage, first.nonce, 2, &CancelFlag::new()).unwrap();
        assert_eq!(first.nonce, again.nonce);
        assert_eq!(again.attempts, 1);

        let later = search(&preimage, first.nonce + 1, 2, &CancelFlag::new()).unwrap();
        assert!(later.nonce > first.nonce);
    }

    #[test]
    fn cancelled_search_stops() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        // 64 zero nibbles is never reached, so only the flag can end this.
        let err = mine(skeleton(), 64, &cancel).unwrap_err();
        assert!(matches!(err, LedgerError::MiningCancelled));
    }
}
