//! Canonical block encoding and block digests.
//!
//! Every node has to hash a block to the same digest, so the encoding is fixed:
//!
//! * keys in lexicographic order (`index`, `nonce`, `previous_hash`,
//!   `timestamp`, `votes`; inside a vote `encrypted_vote`, `signed_hash`,
//!   `signer_id`),
//! * `", "` between members and elements, `": "` between a key and its value,
//! * ASCII-only strings, anything else written as `\uXXXX` escapes,
//! * integers in plain decimal, the timestamp as the shortest decimal that
//!   round-trips the `f64` and always with a fractional part (`12.0`).
//!
//! The digest is the lowercase hex SHA-256 of those bytes.

use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;
use sha2::{Digest, Sha256};

use crate::models::{Block, Vote};

/// The block encoding split around the nonce, so the miner only has to
/// rehash `head ‖ nonce ‖ tail` for every attempt.
#[derive(Debug, Clone)]
pub struct BlockPreimage {
    head: Vec<u8>,
    tail: Vec<u8>,
}

impl BlockPreimage {
    pub fn new(block: &Block) -> Self {
        let mut head = Vec::with_capacity(32);
        head.extend_from_slice(b"{\"index\": ");
        head.extend_from_slice(block.index.to_string().as_bytes());
        head.extend_from_slice(b", \"nonce\": ");

        let votes: Vec<CanonicalVote> = block.votes.iter().map(CanonicalVote::from).collect();
        let mut tail = Vec::with_capacity(128 + 300 * votes.len());
        tail.extend_from_slice(b", \"previous_hash\": ");
        write_canonical(&mut tail, &block.previous_hash);
        tail.extend_from_slice(b", \"timestamp\": ");
        write_canonical(&mut tail, &block.timestamp);
        tail.extend_from_slice(b", \"votes\": ");
        write_canonical(&mut tail, &votes);
        tail.push(b'}');

        BlockPreimage { head, tail }
    }

    pub fn encode(&self, nonce: u64) -> Vec<u8> {
        let nonce = nonce.to_string();
        let mut out = Vec::with_capacity(self.head.len() + nonce.len() + self.tail.len());
        out.extend_from_slice(&self.head);
        out.extend_from_slice(nonce.as_bytes());
        out.extend_from_slice(&self.tail);
        out
    }

    pub fn digest(&self, nonce: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.head);
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(&self.tail);
        hex::encode(hasher.finalize())
    }
}

pub fn encode_block(block: &Block) -> Vec<u8> {
    BlockPreimage::new(block).encode(block.nonce)
}

pub fn hash_block(block: &Block) -> String {
    BlockPreimage::new(block).digest(block.nonce)
}

/// Difficulty predicate: the digest starts with `difficulty` zero nibbles.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

// Field order here is the canonical key order.
#[derive(Serialize)]
struct CanonicalVote<'a> {
    encrypted_vote: &'a str,
    signed_hash: &'a str,
    signer_id: &'a str,
}

impl<'a> From<&'a Vote> for CanonicalVote<'a> {
    fn from(vote: &'a Vote) -> Self {
        CanonicalVote {
            encrypted_vote: &vote.encrypted_vote,
            signed_hash: &vote.signed_hash,
            signer_id: &vote.signer_id,
        }
    }
}

fn write_canonical<T: Serialize + ?Sized>(out: &mut Vec<u8>, value: &T) {
    let mut ser = serde_json::Serializer::with_formatter(out, CanonicalFormatter);
    value
        .serialize(&mut ser)
        .expect("pow_ballot: in-memory serialization of plain data cannot fail");
}

struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_f64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        writer.write_all(format_float(value).as_bytes())
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut units = [0u16; 2];
        let mut start = 0;
        for (pos, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..pos].as_bytes())?;
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = pos + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

fn format_float(value: f64) -> String {
    let mut text = value.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(n: u32) -> Vote {
        Vote {
            signer_id: "33".to_string(),
            encrypted_vote: format!("cafe{:02}", n),
            signed_hash: format!("{}", 1000 + n),
        }
    }

    fn block() -> Block {
        Block {
            index: 2,
            timestamp: 1700000000.25,
            votes: vec![vote(1)],
            nonce: 42,
            previous_hash: "00ab".to_string(),
        }
    }

    #[test]
    fn canonical_encoding_layout() {
        let encoded = String::from_utf8(encode_block(&block())).unwrap();
        assert_eq!(
            encoded,
            "{\"index\": 2, \"nonce\": 42, \"previous_hash\": \"00ab\", \
             \"timestamp\": 1700000000.25, \"votes\": [{\"encrypted_vote\": \"cafe01\", \
             \"signed_hash\": \"1001\", \"signer_id\": \"33\"}]}"
        );
    }

    #[test]
    fn empty_votes_and_whole_timestamps() {
        let mut b = block();
        b.votes.clear();
        b.timestamp = 12.0;
        let encoded = String::from_utf8(encode_block(&b)).unwrap();
        assert!(encoded.ends_with("\"timestamp\": 12.0, \"votes\": []}"));
    }

    #[test]
    fn non_ascii_is_escaped() {
        let mut b = block();
        b.votes[0].signer_id = "é😀\"".to_string();
        let encoded = String::from_utf8(encode_block(&b)).unwrap();
        assert!(encoded.contains(r#""signer_id": "\u00e9\ud83d\ude00\"""#));
        assert!(encoded.is_ascii());
    }

    #[test]
    fn digest_matches_sha256_of_encoding() {
        let b = block();
        let expected = hex::encode(Sha256::digest(encode_block(&b)));
        assert_eq!(hash_block(&b), expected);
        assert_eq!(hash_block(&b).len(), 64);
    }

    #[test]
    fn preimage_tracks_nonce() {
        let b = block();
        let preimage = BlockPreimage::new(&b);
        let mut other = b.clone();
        other.nonce = 9001;
        assert_eq!(preimage.encode(9001), encode_block(&other));
        assert_eq!(preimage.digest(9001), hash_block(&other));
        assert_ne!(preimage.digest(9001), hash_block(&b));
    }

    #[test]
    fn every_field_changes_the_digest() {
        let base = hash_block(&block());

        let mut b = block();
        b.index += 1;
        assert_ne!(hash_block(&b), base);

        let mut b = block();
        b.timestamp += 0.001;
        assert_ne!(hash_block(&b), base);

        let mut b = block();
        b.previous_hash.push('0');
        assert_ne!(hash_block(&b), base);

        let mut b = block();
        b.votes[0].signed_hash.push('1');
        assert_ne!(hash_block(&b), base);
    }

    #[test]
    fn difficulty_predicate() {
        assert!(meets_difficulty("0000ab", 4));
        assert!(!meets_difficulty("000ab0", 4));
        assert!(meets_difficulty("abc", 0));
        assert!(!meets_difficulty("00", 4));
    }
}
