use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rsa::BigUint;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::consensus::ChainSource;
use crate::error::{PeerError, VoteError};
use crate::models::{
    AddVoteRequest, BlindSignResponse, BlindedSignatureResponse, Block, ChainResponse,
    EncryptionRequest, EncryptionResponse, PublicKeyResponse, SigningRequest, Vote,
};
use crate::trusted::blind::{int_from_hex, int_to_hex};
use crate::trusted::SignerPublicKey;
use crate::voter::{EncryptionOracle, LedgerGateway, SigningOracle};

fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// HTTP access to ledger nodes, addressed as `host:port`.
#[derive(Clone)]
pub struct LedgerClient {
    http: Client,
}

impl LedgerClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(LedgerClient {
            http: http_client(timeout)?,
        })
    }

    async fn get_chain(&self, node: &str) -> Result<ChainResponse, PeerError> {
        let response = self
            .http
            .get(format!("http://{}/chain", node))
            .send()
            .await
            .map_err(|e| PeerError::Unreachable {
                peer: node.to_string(),
                reason: e.to_string(),
            })?;
        response
            .json::<ChainResponse>()
            .await
            .map_err(|e| PeerError::MalformedResponse {
                peer: node.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ChainSource for LedgerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, PeerError> {
        self.get_chain(peer).await
    }
}

#[async_trait]
impl LedgerGateway for LedgerClient {
    async fn submit_vote(&self, miner: &str, vote: &Vote) -> Result<bool, VoteError> {
        let request = AddVoteRequest {
            kind: Some("add_vote".to_string()),
            vote: Some(vote.clone().into()),
        };
        let body: serde_json::Value = self
            .http
            .post(format!("http://{}/vote/add", miner))
            .json(&request)
            .send()
            .await?
            .json()
            .await?;
        Ok(body.get("status").and_then(|s| s.as_str()) == Some("received"))
    }

    async fn fetch_chain(&self, miner: &str) -> Result<Vec<Block>, VoteError> {
        self.get_chain(miner)
            .await
            .map(|response| response.chain)
            .map_err(|e| VoteError::Transport(e.to_string()))
    }
}

/// HTTP access to TP1 or TP2.
#[derive(Clone)]
pub struct TrustedPartyClient {
    http: Client,
    address: String,
}

impl TrustedPartyClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(TrustedPartyClient {
            http: http_client(timeout)?,
            address: address.into(),
        })
    }

    async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp, VoteError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body: serde_json::Value = self
            .http
            .post(format!("http://{}/", self.address))
            .json(request)
            .send()
            .await?
            .json()
            .await?;
        if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
            return Err(VoteError::Service(error.to_string()));
        }
        serde_json::from_value(body).map_err(|e| VoteError::Service(e.to_string()))
    }
}

#[async_trait]
impl EncryptionOracle for TrustedPartyClient {
    async fn encrypt_vote(&self, message: &str) -> Result<String, VoteError> {
        let request = EncryptionRequest::EncryptVote {
            message: message.to_string(),
        };
        let response: EncryptionResponse = self.call(&request).await?;
        Ok(response.encrypted_vote)
    }
}

#[async_trait]
impl SigningOracle for TrustedPartyClient {
    async fn blind_sign(&self, digest_hex: &str) -> Result<BlindSignResponse, VoteError> {
        let request = SigningRequest::BlindSign {
            hash: digest_hex.to_string(),
        };
        self.call(&request).await
    }

    async fn public_key(&self) -> Result<SignerPublicKey, VoteError> {
        let response: PublicKeyResponse = self.call(&SigningRequest::PublicKey).await?;
        Ok(SignerPublicKey::from_hex(&response.n, &response.e)?)
    }

    async fn sign_blinded(&self, blinded: &BigUint) -> Result<(BigUint, String), VoteError> {
        let request = SigningRequest::SignBlinded {
            blinded: int_to_hex(blinded),
        };
        let response: BlindedSignatureResponse = self.call(&request).await?;
        let signature = int_from_hex(&response.blind_signature)?;
        Ok((signature, response.signer_id))
    }
}
