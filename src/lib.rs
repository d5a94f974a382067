//! Proof-of-work e-voting ledger: replicated miner nodes, an encryption
//! service (TP1), a blind-signing service (TP2) and the voter protocol.

pub mod admission;
pub mod api;
pub mod client;
pub mod codec;
pub mod config;
pub mod consensus;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod miner;
pub mod models;
pub mod node;
pub mod peers;
pub mod trusted;
pub mod validator;
pub mod voter;
