use log::{debug, warn};

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::models::{Vote, VoteSubmission};

/// Knobs for vote admission.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionPolicy {
    /// Refuse a vote whose `signed_hash` is already pending or recorded.
    pub reject_duplicates: bool,
}

impl TryFrom<VoteSubmission> for Vote {
    type Error = LedgerError;

    fn try_from(submission: VoteSubmission) -> Result<Self, Self::Error> {
        Ok(Vote {
            signer_id: required(submission.signer_id, "signer_id")?,
            encrypted_vote: required(submission.encrypted_vote, "encrypted_vote")?,
            signed_hash: required(submission.signed_hash, "signed_hash")?,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, LedgerError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(LedgerError::MalformedVote(field)),
    }
}

/// Structural check and enqueue. Returns the index of the block the vote is
/// expected to land in.
pub fn admit(
    ledger: &mut Ledger,
    submission: VoteSubmission,
    policy: AdmissionPolicy,
) -> Result<u64, LedgerError> {
    let vote = Vote::try_from(submission).map_err(|e| {
        warn!("rejected vote: {}", e);
        e
    })?;
    if policy.reject_duplicates && ledger.contains_signed_hash(&vote.signed_hash) {
        return Err(LedgerError::DuplicateVote(vote.signed_hash));
    }
    let expected = ledger.head()?.index + 1;
    debug!("vote from signer {} queued for block {}", vote.signer_id, expected);
    ledger.enqueue(vote);
    Ok(expected)
}
