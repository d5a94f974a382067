use log::{debug, info};
use num_bigint_dig::{BigInt, ModInverse, RandBigInt, Sign, ToBigUint};
use rand::rngs::OsRng;
use rand::Rng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};

use crate::error::CryptoError;

/// Parses a hex digest as an unsigned big integer.
pub fn digest_to_int(digest_hex: &str) -> Result<BigUint, CryptoError> {
    let digest = digest_hex.trim();
    if digest.is_empty() {
        return Err(CryptoError::BadHex);
    }
    BigUint::parse_bytes(digest.as_bytes(), 16).ok_or(CryptoError::BadHex)
}

pub fn int_from_hex(value: &str) -> Result<BigUint, CryptoError> {
    digest_to_int(value)
}

pub fn int_to_hex(value: &BigUint) -> String {
    value.to_str_radix(16)
}

/// TP2: signs digests without learning which vote they belong to.
pub struct BlindSigner {
    key: RsaPrivateKey,
    signer_id: String,
}

impl BlindSigner {
    pub fn generate(bits: usize, signer_id: impl Into<String>) -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::new(&mut OsRng, bits)?;
        let signer = Self::from_key(key, signer_id);
        info!("signing key generated ({} bits), signer id {}", bits, signer.signer_id);
        Ok(signer)
    }

    pub fn from_key(key: RsaPrivateKey, signer_id: impl Into<String>) -> Self {
        BlindSigner {
            key,
            signer_id: signer_id.into(),
        }
    }

    pub fn signer_id(&self) -> &str {
        &self.signer_id
    }

    pub fn public_key(&self) -> SignerPublicKey {
        SignerPublicKey {
            n: self.key.n().clone(),
            e: self.key.e().clone(),
        }
    }

    /// Blinds `h` with a fresh factor, signs, and unblinds in one go.
    /// The result is the plain RSA signature `h^d mod n`.
    pub fn blind_sign(&self, digest_hex: &str) -> Result<BigUint, CryptoError> {
        let h = digest_to_int(digest_hex)?;
        let public = self.public_key();
        let blinded = public.blind(&h, &mut OsRng)?;
        let blind_signature = self.sign_blinded(&blinded.value)?;
        debug!("signed digest of {} bits", h.bits());
        Ok(public.unblind(&blind_signature, &blinded))
    }

    /// Raw `m^d mod n` over a value the caller blinded itself.
    pub fn sign_blinded(&self, blinded: &BigUint) -> Result<BigUint, CryptoError> {
        let n = self.key.n();
        if blinded >= n {
            return Err(CryptoError::OutOfRange);
        }
        Ok(blinded.modpow(self.key.d(), n))
    }
}

/// The part of the signing key a voter needs to blind and verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerPublicKey {
    pub n: BigUint,
    pub e: BigUint,
}

/// A blinded digest together with the factor that removes the blinding.
#[derive(Debug, Clone)]
pub struct Blinded {
    pub value: BigUint,
    unblinder: BigUint,
}

impl SignerPublicKey {
    pub fn from_hex(n: &str, e: &str) -> Result<Self, CryptoError> {
        Ok(SignerPublicKey {
            n: int_from_hex(n)?,
            e: int_from_hex(e)?,
        })
    }

    /// `h * r^e mod n` for a random `r` coprime to `n`.
    pub fn blind<R: Rng + ?Sized>(&self, h: &BigUint, rng: &mut R) -> Result<Blinded, CryptoError> {
        if h >= &self.n {
            return Err(CryptoError::OutOfRange);
        }
        let low = BigUint::from(2u32);
        if self.n <= low {
            return Err(CryptoError::OutOfRange);
        }
        loop {
            let r = rng.gen_biguint_range(&low, &self.n);
            if let Some(unblinder) = inverse_mod(&r, &self.n) {
                let value = (h * r.modpow(&self.e, &self.n)) % &self.n;
                return Ok(Blinded { value, unblinder });
            }
        }
    }

    pub fn unblind(&self, blind_signature: &BigUint, blinded: &Blinded) -> BigUint {
        (blind_signature * &blinded.unblinder) % &self.n
    }

    /// `s^e mod n == h`
    pub fn verify(&self, signature: &BigUint, h: &BigUint) -> bool {
        &signature.modpow(&self.e, &self.n) == h
    }
}

fn inverse_mod(r: &BigUint, n: &BigUint) -> Option<BigUint> {
    let inverse = r.clone().mod_inverse(n)?;
    let n = BigInt::from_biguint(Sign::Plus, n.clone());
    ((inverse % &n + &n) % &n).to_biguint()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};
    use std::sync::OnceLock;

    fn signer() -> &'static BlindSigner {
        static SIGNER: OnceLock<BlindSigner> = OnceLock::new();
        SIGNER.get_or_init(|| BlindSigner::generate(1024, "33").unwrap())
    }

    fn digest() -> String {
        hex::encode(Sha256::digest(b"ciphertext bytes"))
    }

    #[test]
    fn blind_signature_equals_plain_rsa_signature() {
        let signer = signer();
        let h = digest_to_int(&digest()).unwrap();
        let signature = signer.blind_sign(&digest()).unwrap();

        assert_eq!(signature, h.modpow(signer.key.d(), signer.key.n()));
        assert!(signer.public_key().verify(&signature, &h));
        // fresh blinding each time, same signature
        assert_eq!(signer.blind_sign(&digest()).unwrap(), signature);
    }

    #[test]
    fn client_side_blinding_unblinds_to_the_same_signature() {
        let signer = signer();
        let public = signer.public_key();
        let h = digest_to_int(&digest()).unwrap();

        let blinded = public.blind(&h, &mut rand::thread_rng()).unwrap();
        assert_ne!(blinded.value, h);
        let blind_signature = signer.sign_blinded(&blinded.value).unwrap();
        let signature = public.unblind(&blind_signature, &blinded);

        assert_eq!(signature, signer.blind_sign(&digest()).unwrap());
        assert!(public.verify(&signature, &h));
    }

    #[test]
    fn public_key_survives_hex() {
        let public = signer().public_key();
        let parsed = SignerPublicKey::from_hex(&int_to_hex(&public.n), &int_to_hex(&public.e)).unwrap();
        assert_eq!(parsed, public);
    }

    #[test]
    fn bad_digests_are_rejected() {
        assert!(matches!(signer().blind_sign("not hex"), Err(CryptoError::BadHex)));
        assert!(matches!(signer().blind_sign(""), Err(CryptoError::BadHex)));
        let too_big = signer().key.n() + BigUint::from(1u32);
        assert!(matches!(signer().sign_blinded(&too_big), Err(CryptoError::OutOfRange)));
    }
}
