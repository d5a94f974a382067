use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Why a single block was rejected against its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockFault {
    #[error("previous_hash does not match the predecessor's hash")]
    BadLinkage,

    #[error("hash does not satisfy the difficulty target")]
    BadProof,

    #[error("timestamp is not later than the predecessor's")]
    BadOrdering,
}

/// Chain validation error, carrying the position of the first offending block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pow_ballot validation: block at position {position} rejected: {fault}")]
pub struct ValidationError {
    pub position: usize,
    pub fault: BlockFault,
}

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("pow_ballot: malformed vote - field `{0}` is missing or empty")]
    MalformedVote(&'static str),

    #[error("pow_ballot: not enough votes to mine ({pending} pending, {required} required)")]
    InsufficientVotes { pending: usize, required: usize },

    #[error("pow_ballot: chain is empty")]
    EmptyChain,

    #[error("pow_ballot: a vote with signed_hash {0} was already admitted")]
    DuplicateVote(String),

    #[error("pow_ballot: invalid peer address `{0}`")]
    InvalidAddress(String),

    #[error("pow_ballot: mined block no longer extends the head of the chain")]
    StaleTemplate,

    #[error("pow_ballot: mining cancelled")]
    MiningCancelled,

    #[error("pow_ballot: nonce space exhausted")]
    NonceSpaceExhausted,

    #[error("pow_ballot: miner task failed: {0}")]
    MinerTask(String),

    #[error("{0}")]
    Invalid(#[from] ValidationError),
}

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::MalformedVote(_)
            | LedgerError::InsufficientVotes { .. }
            | LedgerError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            LedgerError::DuplicateVote(_) => StatusCode::CONFLICT,
            LedgerError::StaleTemplate => StatusCode::CONFLICT,
            LedgerError::MiningCancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "message": self.to_string() }))
    }
}

/// Failures talking to another ledger node.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("pow_ballot: peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("pow_ballot: peer {peer} sent a malformed response: {reason}")]
    MalformedResponse { peer: String, reason: String },

    #[error("pow_ballot: peer {0} did not answer in time")]
    TimedOut(String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("pow_ballot: RSA error: {0}")]
    Rsa(#[from] rsa::errors::Error),

    #[error("pow_ballot: invalid hexadecimal value")]
    BadHex,

    #[error("pow_ballot: value is out of range for the signing key")]
    OutOfRange,
}

/// Terminal failures of a voting attempt.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("pow_ballot voter: transport error: {0}")]
    Transport(String),

    #[error("pow_ballot voter: service error: {0}")]
    Service(String),

    #[error("pow_ballot voter: {0}")]
    Crypto(#[from] CryptoError),

    #[error("pow_ballot voter: only reached {acks}/{required} required miners")]
    QuorumNotMet { acks: usize, required: usize },

    #[error("pow_ballot voter: vote not found in any chain after {0:?}")]
    ConfirmationTimeout(Duration),

    #[error("pow_ballot voter: session is {0:?}, cannot {1}")]
    OutOfOrder(crate::voter::VoterState, &'static str),
}

impl From<reqwest::Error> for VoteError {
    fn from(err: reqwest::Error) -> Self {
        VoteError::Transport(err.to_string())
    }
}
