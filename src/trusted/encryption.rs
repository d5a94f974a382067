use log::info;
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::CryptoError;

/// TP1: encrypts ballots under a key that lives only as long as the process.
pub struct EncryptionService {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl EncryptionService {
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)?;
        info!("encryption key generated ({} bits)", bits);
        Ok(Self::from_key(private_key))
    }

    pub fn from_key(private_key: RsaPrivateKey) -> Self {
        let public_key = RsaPublicKey::from(&private_key);
        EncryptionService {
            private_key,
            public_key,
        }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Only tallying would need this; nothing exposes it over the wire.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// RSA-OAEP with SHA-256.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let ciphertext = self
            .public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)?;
        Ok(ciphertext)
    }

    pub fn encrypt_hex(&self, message: &str) -> Result<String, CryptoError> {
        self.encrypt(message.as_bytes()).map(hex::encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn service() -> &'static EncryptionService {
        static SERVICE: OnceLock<EncryptionService> = OnceLock::new();
        SERVICE.get_or_init(|| EncryptionService::generate(1024).unwrap())
    }

    #[test]
    fn ciphertext_decrypts_with_the_private_key() {
        let message = r#"{"voter_id": "Voter1", "candidate": "A"}"#;
        let ciphertext = hex::decode(service().encrypt_hex(message).unwrap()).unwrap();
        assert_eq!(ciphertext.len(), 128);

        let plaintext = service()
            .private_key()
            .decrypt(Oaep::new::<Sha256>(), &ciphertext)
            .unwrap();
        assert_eq!(plaintext, message.as_bytes());
    }

    #[test]
    fn encryption_is_randomized() {
        let a = service().encrypt_hex("same").unwrap();
        let b = service().encrypt_hex("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn oversized_message_is_an_error() {
        let message = "x".repeat(200);
        assert!(matches!(
            service().encrypt_hex(&message),
            Err(CryptoError::Rsa(_))
        ));
    }
}
