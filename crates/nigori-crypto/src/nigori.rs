//! A single named Nigori key and the blobs it encrypts.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hkdf::Hkdf;
use nigori_core::proto::sync_pb::NigoriKey;
use secrecy::SecretString;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::aead;
use crate::kdf::{derive_key, KeyDerivationParams};
use crate::KEY_SIZE;

/// A 256-bit Nigori key. Zeroized on drop.
///
/// The name is derived from the key bytes, so every device holding the same
/// key agrees on its name without coordination.
#[derive(Clone)]
pub struct NigoriKeyMaterial {
    bytes: [u8; KEY_SIZE],
    name: String,
}

impl NigoriKeyMaterial {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> anyhow::Result<Self> {
        let name = key_name(&bytes)?;
        Ok(Self { bytes, name })
    }

    /// Derive a key from a passphrase (user passphrase or keystore key).
    pub fn derive(params: &KeyDerivationParams, passphrase: &SecretString) -> anyhow::Result<Self> {
        let derived = derive_key(params, passphrase)?;
        Self::from_bytes(*derived)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Encrypt `plaintext`; the key name is bound as associated data.
    pub fn encrypt(&self, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
        aead::seal(&self.bytes, self.name.as_bytes(), plaintext)
    }

    pub fn decrypt(&self, blob: &[u8]) -> anyhow::Result<Vec<u8>> {
        aead::open(&self.bytes, self.name.as_bytes(), blob)
    }

    /// Export for a key bag or a keystore decryptor token.
    pub fn to_proto(&self) -> NigoriKey {
        NigoriKey {
            name: Some(self.name.clone()),
            encryption_key: Some(self.bytes.to_vec()),
        }
    }

    /// Import an exported key. A present name must match the key bytes.
    pub fn from_proto(proto: &NigoriKey) -> anyhow::Result<Self> {
        let raw = proto.encryption_key();
        if raw.len() != KEY_SIZE {
            anyhow::bail!(
                "Nigori key has wrong size: {} bytes (expected {})",
                raw.len(),
                KEY_SIZE
            );
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(raw);
        let key = Self::from_bytes(bytes)?;
        bytes.zeroize();

        if let Some(name) = &proto.name {
            if name != key.name() {
                anyhow::bail!("Nigori key name does not match its key material");
            }
        }
        Ok(key)
    }
}

impl Drop for NigoriKeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for NigoriKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NigoriKeyMaterial")
            .field("name", &self.name)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// HKDF-SHA256 of the key under a fixed domain, base64-encoded.
fn key_name(bytes: &[u8; KEY_SIZE]) -> anyhow::Result<String> {
    let hkdf = Hkdf::<Sha256>::new(None, bytes);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(b"nigori-key-name", &mut okm)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;
    Ok(STANDARD.encode(okm))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(fill: u8) -> NigoriKeyMaterial {
        NigoriKeyMaterial::from_bytes([fill; KEY_SIZE]).unwrap()
    }

    #[test]
    fn test_name_is_deterministic() {
        assert_eq!(test_key(1).name(), test_key(1).name());
        assert_ne!(test_key(1).name(), test_key(2).name());
    }

    #[test]
    fn test_derived_keys_agree_across_devices() {
        let passphrase = SecretString::from("hunter2");
        let a = NigoriKeyMaterial::derive(&KeyDerivationParams::for_pbkdf2(), &passphrase).unwrap();
        let b = NigoriKeyMaterial::derive(&KeyDerivationParams::for_pbkdf2(), &passphrase).unwrap();
        assert_eq!(a.name(), b.name());
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key(5);
        let blob = key.encrypt(b"serialized key bag").unwrap();
        assert_eq!(key.decrypt(&blob).unwrap(), b"serialized key bag");
    }

    #[test]
    fn test_decrypt_with_other_key_fails() {
        let blob = test_key(5).encrypt(b"secret").unwrap();
        assert!(test_key(6).decrypt(&blob).is_err());
    }

    #[test]
    fn test_proto_roundtrip() {
        let key = test_key(9);
        let restored = NigoriKeyMaterial::from_proto(&key.to_proto()).unwrap();
        assert_eq!(restored.name(), key.name());
        assert_eq!(restored.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_from_proto_rejects_mismatched_name() {
        let mut proto = test_key(9).to_proto();
        proto.name = Some(test_key(10).name().to_string());
        assert!(NigoriKeyMaterial::from_proto(&proto).is_err());
    }

    #[test]
    fn test_from_proto_rejects_short_key() {
        let proto = NigoriKey {
            name: None,
            encryption_key: Some(vec![1, 2, 3]),
        };
        assert!(NigoriKeyMaterial::from_proto(&proto).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", test_key(0xAB));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("171, 171"));
    }
}
