//! Facets of the bridge used by the rest of the sync engine.

use std::sync::Arc;
use std::time::SystemTime;

use nigori_core::types::PassphraseType;
use nigori_core::NigoriResult;
use secrecy::SecretString;

use crate::observer::SyncEncryptionObserver;

/// Passphrase and encryption settings entry points.
pub trait SyncEncryptionHandler {
    fn add_observer(&mut self, observer: Arc<dyn SyncEncryptionObserver>);

    fn remove_observer(&mut self, observer: &dyn SyncEncryptionObserver);

    /// Announce the current encrypted types after the first sync cycle.
    fn init(&mut self);

    /// Replace keystore encryption with a user-chosen custom passphrase.
    fn set_encryption_passphrase(&mut self, passphrase: &SecretString) -> NigoriResult<()>;

    /// Unlock pending keys with a passphrase entered by the user.
    fn set_decryption_passphrase(&mut self, passphrase: &SecretString) -> NigoriResult<()>;

    fn enable_encrypt_everything(&mut self) -> NigoriResult<()>;

    fn is_encrypt_everything_enabled(&self) -> bool;

    fn passphrase_type(&self) -> PassphraseType;

    fn keystore_migration_time(&self) -> Option<SystemTime>;

    fn keystore_keys_handler(&mut self) -> &mut dyn KeystoreKeysHandler;
}

/// Keystore keys delivered out of band by the server.
pub trait KeystoreKeysHandler {
    /// True until any keystore key has been supplied.
    fn need_keystore_key(&self) -> bool;

    /// Cache `keys`, newest last. Rejects an empty list or an empty newest key.
    fn set_keystore_keys(&mut self, keys: &[Vec<u8>]) -> bool;
}
