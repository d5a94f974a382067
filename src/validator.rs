use log::debug;

use crate::codec::meets_difficulty;
use crate::error::{BlockFault, ValidationError};
use crate::models::Block;

/// Checks `block` against the block right before it.
pub fn validate_block(block: &Block, predecessor: &Block, difficulty: usize) -> Result<(), BlockFault> {
    if block.previous_hash != predecessor.hash() {
        return Err(BlockFault::BadLinkage);
    }
    if !meets_difficulty(&block.hash(), difficulty) {
        return Err(BlockFault::BadProof);
    }
    if block.timestamp <= predecessor.timestamp {
        return Err(BlockFault::BadOrdering);
    }
    Ok(())
}

/// Validates every adjacent pair; the first block is taken as-is.
pub fn validate_chain(chain: &[Block], difficulty: usize) -> Result<(), ValidationError> {
    for (position, pair) in chain.windows(2).enumerate() {
        let position = position + 1;
        validate_block(&pair[1], &pair[0], difficulty).map_err(|fault| {
            debug!("chain rejected at position {}: {}", position, fault);
            ValidationError { position, fault }
        })?;
    }
    Ok(())
}
