use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec;

/// A vote package as submitted by a voter and recorded inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(deserialize_with = "string_or_number")]
    pub signer_id: String,
    pub encrypted_vote: String,
    #[serde(deserialize_with = "string_or_number")]
    pub signed_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub votes: Vec<Vote>,
    pub nonce: u64,
    pub previous_hash: String,
}

impl Block {
    pub fn hash(&self) -> String {
        codec::hash_block(self)
    }
}

/// Loosely typed vote as it arrives over the wire; admission decides whether
/// it becomes a [`Vote`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteSubmission {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub signer_id: Option<String>,
    #[serde(default)]
    pub encrypted_vote: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub signed_hash: Option<String>,
}

impl From<Vote> for VoteSubmission {
    fn from(vote: Vote) -> Self {
        VoteSubmission {
            signer_id: Some(vote.signer_id),
            encrypted_vote: Some(vote.encrypted_vote),
            signed_hash: Some(vote.signed_hash),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LegacyChainResponse {
    /// The chain serialized a second time, as a JSON string.
    pub blockchain: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddVoteRequest {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub vote: Option<VoteSubmission>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterNodesRequest {
    #[serde(default)]
    pub nodes: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MineResponse {
    pub message: String,
    pub index: u64,
    pub timestamp: f64,
    pub votes: usize,
    pub nonce: u64,
    pub previous_hash: String,
    pub hash: String,
}

impl MineResponse {
    pub fn forged(block: &Block) -> Self {
        MineResponse {
            message: "New Block Forged".to_string(),
            index: block.index,
            timestamp: block.timestamp,
            votes: block.votes.len(),
            nonce: block.nonce,
            previous_hash: truncated(&block.previous_hash),
            hash: truncated(&block.hash()),
        }
    }
}

fn truncated(hash: &str) -> String {
    hash.chars().take(7).collect()
}

// Trusted-party wire types

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EncryptionRequest {
    EncryptVote { message: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptionResponse {
    pub encrypted_vote: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SigningRequest {
    BlindSign { hash: String },
    PublicKey,
    SignBlinded { blinded: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlindSignResponse {
    /// Decimal representation of the signature.
    #[serde(deserialize_with = "string_or_number")]
    pub signature: String,
    #[serde(rename = "signerID", deserialize_with = "string_or_number")]
    pub signer_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    /// Hex modulus
    pub n: String,
    /// Hex public exponent
    pub e: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlindedSignatureResponse {
    /// Hex signature over the blinded value, still blinded.
    pub blind_signature: String,
    #[serde(rename = "signerID", deserialize_with = "string_or_number")]
    pub signer_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// Identifiers and signatures may arrive as JSON integers of any size; the
// digits are kept verbatim.
fn integer_or_string<E: de::Error>(value: Value) -> Result<String, E> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => {
            let digits = n.to_string();
            let unsigned = digits.strip_prefix('-').unwrap_or(&digits);
            if !unsigned.is_empty() && unsigned.bytes().all(|b| b.is_ascii_digit()) {
                Ok(digits)
            } else {
                Err(E::custom(format!("expected an integer, found {}", digits)))
            }
        }
        other => Err(E::custom(format!(
            "expected a string or an integer, found {}",
            other
        ))),
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    integer_or_string(Value::deserialize(deserializer)?)
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Option::<Value>::deserialize(deserializer)?
        .map(integer_or_string)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_accepts_integer_identifiers() {
        let vote: Vote = serde_json::from_str(
            r#"{"signer_id": 33, "encrypted_vote": "abcd", "signed_hash": 123456789}"#,
        )
        .unwrap();
        assert_eq!(vote.signer_id, "33");
        assert_eq!(vote.signed_hash, "123456789");
    }

    fn wide_integer() -> String {
        let mut digits = String::from("9");
        for n in 0..640 {
            digits.push(char::from(b'0' + (n % 10) as u8));
        }
        digits
    }

    #[test]
    fn integer_signatures_keep_every_digit() {
        let wide = wide_integer();

        let submission: VoteSubmission = serde_json::from_str(&format!(
            r#"{{"signer_id": 33, "encrypted_vote": "abcd", "signed_hash": {}}}"#,
            wide
        ))
        .unwrap();
        assert_eq!(submission.signed_hash.as_deref(), Some(wide.as_str()));

        let vote: Vote = serde_json::from_str(&format!(
            r#"{{"signer_id": "33", "encrypted_vote": "abcd", "signed_hash": {}}}"#,
            wide
        ))
        .unwrap();
        assert_eq!(vote.signed_hash, wide);

        let response: BlindSignResponse = serde_json::from_str(&format!(
            r#"{{"signature": {}, "signerID": -7}}"#,
            wide
        ))
        .unwrap();
        assert_eq!(response.signature, wide);
        assert_eq!(response.signer_id, "-7");
    }

    #[test]
    fn fractional_or_structured_identifiers_are_rejected() {
        assert!(serde_json::from_str::<Vote>(
            r#"{"signer_id": 3.5, "encrypted_vote": "abcd", "signed_hash": "1"}"#
        )
        .is_err());
        assert!(serde_json::from_str::<VoteSubmission>(
            r#"{"signer_id": "33", "encrypted_vote": "abcd", "signed_hash": [1]}"#
        )
        .is_err());
    }

    #[test]
    fn submission_tolerates_missing_fields() {
        let submission: VoteSubmission =
            serde_json::from_str(r#"{"encrypted_vote": "abcd", "signer_id": null}"#).unwrap();
        assert!(submission.signer_id.is_none());
        assert!(submission.signed_hash.is_none());
        assert_eq!(submission.encrypted_vote.as_deref(), Some("abcd"));
    }

    #[test]
    fn mine_response_truncates_hashes() {
        let block = Block {
            index: 2,
            timestamp: 10.5,
            votes: vec![],
            nonce: 7,
            previous_hash: "0000abcdef0123".to_string(),
        };
        let response = MineResponse::forged(&block);
        assert_eq!(response.previous_hash, "0000abc");
        assert_eq!(response.hash.len(), 7);
        assert_eq!(response.message, "New Block Forged");
    }

    #[test]
    fn signing_request_uses_type_tag() {
        let request: SigningRequest =
            serde_json::from_str(r#"{"type": "blind_sign", "hash": "ff"}"#).unwrap();
        assert!(matches!(request, SigningRequest::BlindSign { hash } if hash == "ff"));

        let json = serde_json::to_value(BlindSignResponse {
            signature: "42".to_string(),
            signer_id: "33".to_string(),
        })
        .unwrap();
        assert_eq!(json["signerID"], "33");
        assert_eq!(json["signature"], "42");
    }
}
