//! Cryptographer: the working set of Nigori keys
//!
//! Holds zero or more keys, one of them default, plus an optional pending key
//! bag received from the server that none of the known keys can decrypt yet.
//! Adding or importing a key that opens the pending key bag installs it.

use anyhow::Context;
use nigori_core::proto::sync_pb::{EncryptedData, NigoriKey, NigoriKeyBag};
use prost::Message;
use secrecy::SecretString;
use std::collections::BTreeMap;
use zeroize::Zeroizing;

use crate::kdf::KeyDerivationParams;
use crate::nigori::NigoriKeyMaterial;

#[derive(Clone, Default)]
pub struct Cryptographer {
    /// Key name → key
    keys: BTreeMap<String, NigoriKeyMaterial>,
    default_key_name: Option<String>,
    pending_keys: Option<EncryptedData>,
}

impl Cryptographer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a key from `passphrase` and make it the default.
    pub fn add_key(
        &mut self,
        params: &KeyDerivationParams,
        passphrase: &SecretString,
    ) -> anyhow::Result<()> {
        let key = NigoriKeyMaterial::derive(params, passphrase)?;
        self.add_key_impl(key)
    }

    /// Install a single serialized `NigoriKey` and make it the default.
    pub fn import_nigori_key(&mut self, serialized: &[u8]) -> anyhow::Result<()> {
        let proto = NigoriKey::decode(serialized).context("decoding serialized Nigori key")?;
        let key = NigoriKeyMaterial::from_proto(&proto)?;
        self.add_key_impl(key)
    }

    fn add_key_impl(&mut self, key: NigoriKeyMaterial) -> anyhow::Result<()> {
        let name = key.name().to_string();
        self.keys.insert(name.clone(), key);
        self.default_key_name = Some(name);

        if let Some(pending) = self.pending_keys.clone() {
            if self.can_decrypt(&pending) {
                self.install_keys(&pending)?;
            }
        }
        Ok(())
    }

    /// Encrypt `plaintext` under the default key.
    pub fn encrypt_string(&self, plaintext: &[u8]) -> anyhow::Result<EncryptedData> {
        let key = self
            .default_key()
            .ok_or_else(|| anyhow::anyhow!("cryptographer has no default key"))?;
        Ok(EncryptedData {
            key_name: Some(key.name().to_string()),
            blob: Some(key.encrypt(plaintext)?),
        })
    }

    /// Decrypt with the key named by the blob, or with any known key when the
    /// blob carries no name.
    pub fn decrypt_to_string(&self, encrypted: &EncryptedData) -> anyhow::Result<Vec<u8>> {
        let blob = encrypted.blob();
        let key_name = encrypted.key_name();

        if key_name.is_empty() {
            return self
                .keys
                .values()
                .find_map(|key| key.decrypt(blob).ok())
                .ok_or_else(|| anyhow::anyhow!("no known key decrypts the blob"));
        }

        let key = self
            .keys
            .get(key_name)
            .ok_or_else(|| anyhow::anyhow!("unknown key name: {key_name}"))?;
        key.decrypt(blob)
    }

    /// Whether a known key decrypts `encrypted` with an intact tag.
    pub fn can_decrypt(&self, encrypted: &EncryptedData) -> bool {
        self.decrypt_to_string(encrypted).is_ok()
    }

    /// Remember a key bag that cannot be decrypted yet.
    pub fn set_pending_keys(&mut self, encrypted: EncryptedData) {
        self.pending_keys = Some(encrypted);
    }

    pub fn has_pending_keys(&self) -> bool {
        self.pending_keys.is_some()
    }

    pub fn pending_keys(&self) -> Option<&EncryptedData> {
        self.pending_keys.as_ref()
    }

    /// Decrypt a key bag and merge its keys into the working set.
    ///
    /// The key that encrypted the bag becomes the default and the pending
    /// state is cleared.
    pub fn install_keys(&mut self, encrypted: &EncryptedData) -> anyhow::Result<()> {
        let plaintext = Zeroizing::new(
            self.decrypt_to_string(encrypted)
                .context("decrypting key bag")?,
        );
        let bag = NigoriKeyBag::decode(plaintext.as_slice()).context("decoding key bag")?;
        if bag.key.is_empty() {
            anyhow::bail!("key bag contains no keys");
        }

        for proto in &bag.key {
            let key = NigoriKeyMaterial::from_proto(proto)?;
            self.keys.insert(key.name().to_string(), key);
        }

        let bag_key_name = encrypted.key_name();
        if self.keys.contains_key(bag_key_name) {
            self.default_key_name = Some(bag_key_name.to_string());
        }
        self.pending_keys = None;

        tracing::debug!(keys = self.keys.len(), "installed key bag");
        Ok(())
    }

    /// Serialized `NigoriKey` of the default key.
    pub fn default_nigori_key_data(&self) -> anyhow::Result<Zeroizing<Vec<u8>>> {
        let key = self
            .default_key()
            .ok_or_else(|| anyhow::anyhow!("cryptographer has no default key"))?;
        Ok(Zeroizing::new(key.to_proto().encode_to_vec()))
    }

    /// The full key set, encrypted under the default key.
    pub fn get_keys(&self) -> anyhow::Result<EncryptedData> {
        let bag = NigoriKeyBag {
            key: self.keys.values().map(NigoriKeyMaterial::to_proto).collect(),
        };
        let serialized = Zeroizing::new(bag.encode_to_vec());
        self.encrypt_string(&serialized)
    }

    /// Has a default key.
    pub fn is_initialized(&self) -> bool {
        self.default_key_name.is_some()
    }

    /// Has a default key and nothing pending.
    pub fn is_ready(&self) -> bool {
        self.is_initialized() && !self.has_pending_keys()
    }

    pub fn default_key_name(&self) -> Option<&str> {
        self.default_key_name.as_deref()
    }

    pub fn has_key(&self, name: &str) -> bool {
        self.keys.contains_key(name)
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn default_key(&self) -> Option<&NigoriKeyMaterial> {
        self.default_key_name
            .as_ref()
            .and_then(|name| self.keys.get(name))
    }
}

impl std::fmt::Debug for Cryptographer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cryptographer")
            .field("keys", &self.keys.len())
            .field("default_key_name", &self.default_key_name)
            .field("has_pending_keys", &self.has_pending_keys())
            .finish()
    }
}
