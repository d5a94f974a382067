use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::task::JoinHandle;

use crate::error::LedgerError;
use crate::node::LedgerNode;

/// Periodically mines every full batch, then resolves against the peers.
pub fn spawn_auto_miner(node: Arc<LedgerNode>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if node.is_shutting_down() {
                info!("auto miner stopped");
                return;
            }
            run_round(&node).await;
        }
    })
}

/// One mine-then-resolve round. Returns the number of blocks forged.
pub async fn run_round(node: &LedgerNode) -> usize {
    let mut forged = 0;
    loop {
        match node.mine().await {
            Ok(_) => forged += 1,
            Err(LedgerError::InsufficientVotes { .. }) => break,
            Err(LedgerError::MiningCancelled) => return forged,
            Err(e) => {
                error!("auto miner: {}", e);
                break;
            }
        }
    }
    match node.resolve().await {
        Ok(report) => info!(
            "auto miner: {:?} after forging {} blocks, chain length {}",
            report.resolution, forged, report.length
        ),
        Err(e) => warn!("auto miner: resolution failed: {}", e),
    }
    forged
}
