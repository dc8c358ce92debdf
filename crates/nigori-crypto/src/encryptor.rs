//! Local string encryption for secrets cached on this device only
//! (the explicit passphrase bootstrap token).

use rand::RngCore;
use zeroize::Zeroizing;

use crate::aead;
use crate::KEY_SIZE;

const BOOTSTRAP_AAD: &[u8] = b"nigori-bootstrap-token";

/// Device-local encryption capability, injected into the bridge.
pub trait Encryptor: Send + Sync {
    fn encrypt_string(&self, plaintext: &[u8]) -> anyhow::Result<Vec<u8>>;
    fn decrypt_string(&self, ciphertext: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// XChaCha20-Poly1305 under a device-local 256-bit key.
pub struct LocalKeyEncryptor {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl LocalKeyEncryptor {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// A fresh random key; tokens do not survive the process.
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        rand::thread_rng().fill_bytes(&mut key[..]);
        Self { key }
    }
}

impl Encryptor for LocalKeyEncryptor {
    fn encrypt_string(&self, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
        aead::seal(&self.key, BOOTSTRAP_AAD, plaintext)
    }

    fn decrypt_string(&self, ciphertext: &[u8]) -> anyhow::Result<Vec<u8>> {
        aead::open(&self.key, BOOTSTRAP_AAD, ciphertext)
    }
}

impl std::fmt::Debug for LocalKeyEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyEncryptor")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let encryptor = LocalKeyEncryptor::new([4u8; KEY_SIZE]);
        let ciphertext = encryptor.encrypt_string(b"default key").unwrap();
        assert_eq!(encryptor.decrypt_string(&ciphertext).unwrap(), b"default key");
    }

    #[test]
    fn test_generated_keys_differ() {
        let ciphertext = LocalKeyEncryptor::generate()
            .encrypt_string(b"token")
            .unwrap();
        assert!(LocalKeyEncryptor::generate()
            .decrypt_string(&ciphertext)
            .is_err());
    }
}
