//! The two trusted parties: TP1 encrypts ballots, TP2 blind-signs digests.

pub mod blind;
pub mod encryption;

pub use blind::{digest_to_int, BlindSigner, Blinded, SignerPublicKey};
pub use encryption::EncryptionService;
