use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rsa::BigUint;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::config::VoterConfig;
use crate::error::{CryptoError, VoteError};
use crate::ledger;
use crate::models::{BlindSignResponse, Block, Vote};
use crate::trusted::{digest_to_int, SignerPublicKey};

/// Encryption service as seen by a voter.
#[async_trait]
pub trait EncryptionOracle: Send + Sync {
    /// Returns the hex ciphertext of `message`.
    async fn encrypt_vote(&self, message: &str) -> Result<String, VoteError>;
}

/// Blind-signing service as seen by a voter.
#[async_trait]
pub trait SigningOracle: Send + Sync {
    async fn blind_sign(&self, digest_hex: &str) -> Result<BlindSignResponse, VoteError>;

    async fn public_key(&self) -> Result<SignerPublicKey, VoteError>;

    /// Returns the still-blinded signature and the signer id.
    async fn sign_blinded(&self, blinded: &BigUint) -> Result<(BigUint, String), VoteError>;
}

/// The ledger nodes a voter talks to.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// True when `miner` acknowledged the vote with `status == "received"`.
    async fn submit_vote(&self, miner: &str, vote: &Vote) -> Result<bool, VoteError>;

    async fn fetch_chain(&self, miner: &str) -> Result<Vec<Block>, VoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoterState {
    Init,
    Encrypted,
    Signed,
    Broadcast,
    Confirmed { block_index: u64 },
    Failed,
}

impl VoterState {
    /// `Confirmed` and `Failed` are never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, VoterState::Confirmed { .. } | VoterState::Failed)
    }
}

/// One voting attempt.
#[derive(Debug)]
pub struct VoterSession {
    voter_id: String,
    candidate: String,
    state: VoterState,
    history: Vec<VoterState>,
    encrypted_vote: Option<String>,
    signer_id: Option<String>,
    signed_hash: Option<String>,
    failure: Option<String>,
}

impl VoterSession {
    pub fn new(voter_id: impl Into<String>, candidate: impl Into<String>) -> Self {
        VoterSession {
            voter_id: voter_id.into(),
            candidate: candidate.into(),
            state: VoterState::Init,
            history: vec![VoterState::Init],
            encrypted_vote: None,
            signer_id: None,
            signed_hash: None,
            failure: None,
        }
    }

    pub fn voter_id(&self) -> &str {
        &self.voter_id
    }

    pub fn state(&self) -> VoterState {
        self.state
    }

    /// Every state the session went through, starting with `Init`.
    pub fn history(&self) -> &[VoterState] {
        &self.history
    }

    pub fn encrypted_vote(&self) -> Option<&str> {
        self.encrypted_vote.as_deref()
    }

    pub fn signer_id(&self) -> Option<&str> {
        self.signer_id.as_deref()
    }

    pub fn signed_hash(&self) -> Option<&str> {
        self.signed_hash.as_deref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// The package broadcast to the miners, once signed.
    pub fn vote(&self) -> Option<Vote> {
        Some(Vote {
            signer_id: self.signer_id.clone()?,
            encrypted_vote: self.encrypted_vote.clone()?,
            signed_hash: self.signed_hash.clone()?,
        })
    }

    fn advance(&mut self, state: VoterState) {
        self.state = state;
        self.history.push(state);
    }

    fn require(&self, state: VoterState, step: &'static str) -> Result<(), VoteError> {
        if self.state == state {
            Ok(())
        } else {
            Err(VoteError::OutOfOrder(self.state, step))
        }
    }

    fn fail(&mut self, err: &VoteError) {
        if self.state.is_terminal() {
            return;
        }
        self.failure = Some(err.to_string());
        self.advance(VoterState::Failed);
    }
}

/// Drives a [`VoterSession`] through encryption, signing, broadcast and
/// confirmation.
pub struct VoterProtocol {
    config: VoterConfig,
    encryption: Arc<dyn EncryptionOracle>,
    signing: Arc<dyn SigningOracle>,
    ledgers: Arc<dyn LedgerGateway>,
}

impl VoterProtocol {
    pub fn new(
        config: VoterConfig,
        encryption: Arc<dyn EncryptionOracle>,
        signing: Arc<dyn SigningOracle>,
        ledgers: Arc<dyn LedgerGateway>,
    ) -> Self {
        VoterProtocol {
            config,
            encryption,
            signing,
            ledgers,
        }
    }

    /// Runs every step; any error leaves a live session `Failed`. A finished
    /// session is rejected as out of order and left as it was.
    pub async fn cast(&self, session: &mut VoterSession) -> Result<u64, VoteError> {
        let result = self.run(session).await;
        match &result {
            Ok(index) => info!("{} vote confirmed in block {}", session.voter_id, index),
            Err(e) => {
                warn!("voting failed for {}: {}", session.voter_id, e);
                session.fail(e);
            }
        }
        result
    }

    async fn run(&self, session: &mut VoterSession) -> Result<u64, VoteError> {
        self.encrypt(session).await?;
        self.sign(session).await?;
        self.broadcast(session).await?;
        self.await_confirmation(session).await
    }

    pub async fn encrypt(&self, session: &mut VoterSession) -> Result<(), VoteError> {
        session.require(VoterState::Init, "encrypt")?;
        let ballot = json!({
            "voter_id": session.voter_id,
            "candidate": session.candidate,
            "timestamp": ledger::now(),
        })
        .to_string();
        let encrypted = self.encryption.encrypt_vote(&ballot).await?;
        hex::decode(&encrypted).map_err(|_| CryptoError::BadHex)?;
        session.encrypted_vote = Some(encrypted);
        session.advance(VoterState::Encrypted);
        Ok(())
    }

    /// Signs SHA-256 of the raw ciphertext bytes.
    pub async fn sign(&self, session: &mut VoterSession) -> Result<(), VoteError> {
        session.require(VoterState::Encrypted, "sign")?;
        let ciphertext = session
            .encrypted_vote
            .as_deref()
            .map(hex::decode)
            .transpose()
            .map_err(|_| CryptoError::BadHex)?
            .unwrap_or_default();
        let digest = hex::encode(Sha256::digest(&ciphertext));

        let (signature, signer_id) = if self.config.client_blinding {
            self.sign_with_client_blinding(&digest).await?
        } else {
            let response = self.signing.blind_sign(&digest).await?;
            (response.signature, response.signer_id)
        };

        session.signed_hash = Some(signature);
        session.signer_id = Some(signer_id);
        session.advance(VoterState::Signed);
        Ok(())
    }

    async fn sign_with_client_blinding(&self, digest: &str) -> Result<(String, String), VoteError> {
        let public = self.signing.public_key().await?;
        let h = digest_to_int(digest)?;
        let blinded = public.blind(&h, &mut OsRng)?;
        let (blind_signature, signer_id) = self.signing.sign_blinded(&blinded.value).await?;
        let signature = public.unblind(&blind_signature, &blinded);
        if !public.verify(&signature, &h) {
            return Err(VoteError::Service("signature does not verify".to_string()));
        }
        Ok((signature.to_str_radix(10), signer_id))
    }

    /// Submits to the miners in random order until `quorum` acknowledged.
    pub async fn broadcast(&self, session: &mut VoterSession) -> Result<usize, VoteError> {
        session.require(VoterState::Signed, "broadcast")?;
        let vote = session
            .vote()
            .ok_or(VoteError::OutOfOrder(session.state, "broadcast"))?;

        let mut miners = self.config.miners.clone();
        miners.shuffle(&mut OsRng);

        let required = self.config.quorum;
        let mut acks = 0;
        for miner in &miners {
            if acks >= required {
                break;
            }
            match self.ledgers.submit_vote(miner, &vote).await {
                Ok(true) => acks += 1,
                Ok(false) => warn!("miner {} refused the vote of {}", miner, session.voter_id),
                Err(e) => warn!("couldn't reach miner {}: {}", miner, e),
            }
        }
        if acks < required {
            return Err(VoteError::QuorumNotMet { acks, required });
        }
        info!("vote from {} accepted by {} miners", session.voter_id, acks);
        session.advance(VoterState::Broadcast);
        Ok(acks)
    }

    /// Polls every miner's chain until the vote shows up in a block.
    pub async fn await_confirmation(&self, session: &mut VoterSession) -> Result<u64, VoteError> {
        session.require(VoterState::Broadcast, "await confirmation")?;
        let signed_hash = session.signed_hash.clone().unwrap_or_default();
        let deadline = Instant::now() + self.config.confirmation_timeout;

        loop {
            for miner in &self.config.miners {
                let chain = match self.ledgers.fetch_chain(miner).await {
                    Ok(chain) => chain,
                    Err(e) => {
                        warn!("couldn't read chain of {}: {}", miner, e);
                        continue;
                    }
                };
                let found = chain
                    .iter()
                    .find(|block| block.votes.iter().any(|v| v.signed_hash == signed_hash));
                if let Some(block) = found {
                    session.advance(VoterState::Confirmed {
                        block_index: block.index,
                    });
                    return Ok(block.index);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(VoteError::ConfirmationTimeout(self.config.confirmation_timeout));
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trusted::BlindSigner;
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    struct HexEcho;

    #[async_trait]
    impl EncryptionOracle for HexEcho {
        async fn encrypt_vote(&self, message: &str) -> Result<String, VoteError> {
            Ok(hex::encode(message))
        }
    }

    fn signer() -> &'static BlindSigner {
        static SIGNER: OnceLock<BlindSigner> = OnceLock::new();
        SIGNER.get_or_init(|| BlindSigner::generate(1024, "33").unwrap())
    }

    struct LocalSigner;

    #[async_trait]
    impl SigningOracle for LocalSigner {
        async fn blind_sign(&self, digest_hex: &str) -> Result<BlindSignResponse, VoteError> {
            Ok(BlindSignResponse {
                signature: signer().blind_sign(digest_hex)?.to_str_radix(10),
                signer_id: signer().signer_id().to_string(),
            })
        }

        async fn public_key(&self) -> Result<SignerPublicKey, VoteError> {
            Ok(signer().public_key())
        }

        async fn sign_blinded(&self, blinded: &BigUint) -> Result<(BigUint, String), VoteError> {
            Ok((signer().sign_blinded(blinded)?, signer().signer_id().to_string()))
        }
    }

    /// Miners that either accept and include every vote, or are down.
    #[derive(Default)]
    struct FakeMiners {
        up: Vec<String>,
        received: Mutex<HashMap<String, Vec<Vote>>>,
    }

    #[async_trait]
    impl LedgerGateway for FakeMiners {
        async fn submit_vote(&self, miner: &str, vote: &Vote) -> Result<bool, VoteError> {
            if !self.up.iter().any(|m| m == miner) {
                return Err(VoteError::Transport(format!("{} refused connection", miner)));
            }
            let mut received = self.received.lock().unwrap();
            received.entry(miner.to_string()).or_default().push(vote.clone());
            Ok(true)
        }

        async fn fetch_chain(&self, miner: &str) -> Result<Vec<Block>, VoteError> {
            let received = self.received.lock().unwrap();
            let votes = received.get(miner).cloned().unwrap_or_default();
            Ok(vec![Block {
                index: 2,
                timestamp: 1.0,
                votes,
                nonce: 0,
                previous_hash: "1".to_string(),
            }])
        }
    }

    fn protocol(up: &[&str], client_blinding: bool) -> (VoterProtocol, Arc<FakeMiners>) {
        let miners = Arc::new(FakeMiners {
            up: up.iter().map(|m| m.to_string()).collect(),
            ..FakeMiners::default()
        });
        let config = VoterConfig {
            miners: vec!["m1".to_string(), "m2".to_string(), "m3".to_string()],
            poll_interval: Duration::from_millis(10),
            confirmation_timeout: Duration::from_millis(50),
            client_blinding,
            ..VoterConfig::default()
        };
        let protocol = VoterProtocol::new(config, Arc::new(HexEcho), Arc::new(LocalSigner), miners.clone());
        (protocol, miners)
    }

    #[tokio::test]
    async fn vote_is_confirmed_once_included() {
        let (protocol, miners) = protocol(&["m1", "m2", "m3"], false);
        let mut session = VoterSession::new("Voter1", "CandidateA");

        let index = protocol.cast(&mut session).await.unwrap();

        assert_eq!(index, 2);
        assert_eq!(
            session.history(),
            &[
                VoterState::Init,
                VoterState::Encrypted,
                VoterState::Signed,
                VoterState::Broadcast,
                VoterState::Confirmed { block_index: 2 },
            ]
        );
        let total: usize = miners.received.lock().unwrap().values().map(Vec::len).sum();
        assert_eq!(total, 2);
        assert_eq!(session.signer_id(), Some("33"));
    }

    #[tokio::test]
    async fn signature_covers_the_ciphertext_digest() {
        let (protocol, _) = protocol(&["m1", "m2", "m3"], false);
        let mut session = VoterSession::new("Voter2", "CandidateB");
        protocol.encrypt(&mut session).await.unwrap();
        protocol.sign(&mut session).await.unwrap();

        let ciphertext = hex::decode(session.encrypted_vote().unwrap()).unwrap();
        let h = BigUint::from_bytes_be(&Sha256::digest(&ciphertext));
        let signature = BigUint::parse_bytes(session.signed_hash().unwrap().as_bytes(), 10).unwrap();
        assert!(signer().public_key().verify(&signature, &h));
    }

    #[tokio::test]
    async fn client_blinding_yields_the_same_signature() {
        let (plain, _) = protocol(&[], false);
        let (blinded, _) = protocol(&[], true);
        let mut a = VoterSession::new("Voter3", "CandidateA");
        plain.encrypt(&mut a).await.unwrap();
        let mut b = VoterSession {
            encrypted_vote: a.encrypted_vote.clone(),
            state: VoterState::Encrypted,
            ..VoterSession::new("Voter3", "CandidateA")
        };
        plain.sign(&mut a).await.unwrap();
        blinded.sign(&mut b).await.unwrap();
        assert_eq!(a.signed_hash(), b.signed_hash());
    }

    #[tokio::test]
    async fn single_ack_misses_a_quorum_of_two() {
        let (protocol, _) = protocol(&["m2"], false);
        let mut session = VoterSession::new("Voter4", "CandidateA");

        let err = protocol.cast(&mut session).await.unwrap_err();

        assert!(matches!(
            err,
            VoteError::QuorumNotMet {
                acks: 1,
                required: 2
            }
        ));
        assert_eq!(session.state(), VoterState::Failed);
        assert_eq!(
            session.history(),
            &[
                VoterState::Init,
                VoterState::Encrypted,
                VoterState::Signed,
                VoterState::Failed,
            ]
        );
        assert!(session.failure().unwrap().contains("1/2"));
    }

    #[tokio::test]
    async fn steps_must_run_in_order() {
        let (protocol, _) = protocol(&["m1", "m2"], false);
        let mut session = VoterSession::new("Voter5", "CandidateA");
        assert!(matches!(
            protocol.sign(&mut session).await,
            Err(VoteError::OutOfOrder(VoterState::Init, "sign"))
        ));
        assert_eq!(session.state(), VoterState::Init);
    }

    #[tokio::test]
    async fn finished_sessions_stay_finished() {
        let (healthy, _) = protocol(&["m1", "m2", "m3"], false);
        let mut confirmed = VoterSession::new("Voter7", "CandidateA");
        healthy.cast(&mut confirmed).await.unwrap();
        let history = confirmed.history().to_vec();

        assert!(matches!(
            healthy.cast(&mut confirmed).await,
            Err(VoteError::OutOfOrder(VoterState::Confirmed { block_index: 2 }, "encrypt"))
        ));
        assert_eq!(confirmed.state(), VoterState::Confirmed { block_index: 2 });
        assert_eq!(confirmed.history(), history.as_slice());
        assert!(confirmed.failure().is_none());

        let (starved, _) = protocol(&["m2"], false);
        let mut failed = VoterSession::new("Voter8", "CandidateB");
        starved.cast(&mut failed).await.unwrap_err();
        let history = failed.history().to_vec();
        let reason = failed.failure().map(str::to_string);

        starved.cast(&mut failed).await.unwrap_err();
        assert_eq!(failed.history(), history.as_slice());
        assert_eq!(failed.failure().map(str::to_string), reason);
    }

    #[tokio::test]
    async fn unseen_vote_times_out() {
        struct BlackHole;

        #[async_trait]
        impl LedgerGateway for BlackHole {
            async fn submit_vote(&self, _miner: &str, _vote: &Vote) -> Result<bool, VoteError> {
                Ok(true)
            }

            async fn fetch_chain(&self, _miner: &str) -> Result<Vec<Block>, VoteError> {
                Ok(vec![])
            }
        }

        let config = VoterConfig {
            miners: vec!["m1".to_string(), "m2".to_string()],
            poll_interval: Duration::from_millis(10),
            confirmation_timeout: Duration::from_millis(30),
            ..VoterConfig::default()
        };
        let protocol = VoterProtocol::new(config, Arc::new(HexEcho), Arc::new(LocalSigner), Arc::new(BlackHole));
        let mut session = VoterSession::new("Voter6", "CandidateB");

        let err = protocol.cast(&mut session).await.unwrap_err();
        assert!(matches!(err, VoteError::ConfirmationTimeout(_)));
        assert_eq!(
            &session.history()[session.history().len() - 2..],
            &[VoterState::Broadcast, VoterState::Failed]
        );
    }
}
