//! NigoriSyncBridge: the passphrase-type state machine.
//!
//! The bridge owns the Cryptographer and the keystore key cache. Server
//! records arrive through `merge_sync_data` (first sync) and
//! `apply_sync_changes`; the user drives `set_encryption_passphrase` and
//! `set_decryption_passphrase`. Every accepted change is announced to the
//! observers, synchronously and in a fixed order.
//!
//! State machine:
//! ```text
//! UNKNOWN ──► KEYSTORE ──► CUSTOM
//!    │                       ▲
//!    └──► FROZEN_IMPLICIT ───┘
//! ```
//! UNKNOWN may also jump straight to CUSTOM. CUSTOM is terminal.

use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use nigori_core::config::CryptoConfig;
use nigori_core::proto::sync_pb::{EncryptedData, NigoriSpecifics};
use nigori_core::time::{proto_time_to_time, time_to_proto_time};
use nigori_core::types::{
    encryptable_user_types, sensitive_types, update_specifics_from_encrypted_types,
    BootstrapTokenType, ConflictResolution, EntityData, PassphraseRequiredReason, PassphraseType,
};
use nigori_core::{NigoriError, NigoriResult};
use nigori_crypto::{generate_scrypt_salt, Cryptographer, Encryptor, KeyDerivationParams};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::handler::{KeystoreKeysHandler, SyncEncryptionHandler};
use crate::key_derivation::{derive_params_from_specifics, encode_params_into_specifics};
use crate::observer::{ObserverList, SyncEncryptionObserver};
use crate::processor::NigoriLocalChangeProcessor;
use crate::validation::{
    blob_is_empty, is_valid_encrypted_types_transition, is_valid_passphrase_transition,
    is_valid_specifics,
};

// ── Keystore helpers ──────────────────────────────────────────────────────────

/// Recover the serialized Nigori key wrapped in `keystore_decryptor_token`.
///
/// Every keystore key is tried; any of them may have wrapped the token.
pub fn decrypt_keystore_decryptor(
    keystore_keys: &[SecretString],
    keystore_decryptor_token: &EncryptedData,
) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    if keystore_decryptor_token.blob().is_empty() {
        anyhow::bail!("keystore decryptor token is empty");
    }

    let mut cryptographer = Cryptographer::new();
    for key in keystore_keys {
        cryptographer
            .add_key(&KeyDerivationParams::for_pbkdf2(), key)
            .context("deriving keystore key")?;
    }
    let serialized = cryptographer
        .decrypt_to_string(keystore_decryptor_token)
        .context("no keystore key decrypts the keystore decryptor token")?;
    Ok(Zeroizing::new(serialized))
}

/// Build the keystore Nigori used when the server has none yet.
///
/// The key bag holds every keystore key and is encrypted with the newest one;
/// the decryptor token is the newest key encrypted with itself.
pub fn make_default_keystore_nigori(
    keystore_keys: &[SecretString],
) -> anyhow::Result<NigoriSpecifics> {
    if keystore_keys.is_empty() {
        anyhow::bail!("no keystore keys");
    }

    let mut cryptographer = Cryptographer::new();
    for key in keystore_keys {
        cryptographer
            .add_key(&KeyDerivationParams::for_pbkdf2(), key)
            .context("adding keystore key")?;
    }

    let default_key = cryptographer.default_nigori_key_data()?;
    let keystore_decryptor_token = cryptographer
        .encrypt_string(&default_key)
        .context("encrypting keystore decryptor token")?;
    let encryption_keybag = cryptographer
        .get_keys()
        .context("encrypting keystore keys into the key bag")?;

    Ok(NigoriSpecifics {
        encryption_keybag: Some(encryption_keybag),
        keystore_decryptor_token: Some(keystore_decryptor_token),
        passphrase_type: Some(PassphraseType::Keystore.to_proto()),
        keybag_is_frozen: Some(true),
        keystore_migration_time: Some(time_to_proto_time(SystemTime::now())),
        ..Default::default()
    })
}

// ── Bootstrap token ───────────────────────────────────────────────────────────

/// Encrypt the default (explicit passphrase) key for local caching, base64.
pub fn pack_explicit_passphrase_key(
    encryptor: &dyn Encryptor,
    cryptographer: &Cryptographer,
) -> anyhow::Result<String> {
    let serialized = cryptographer
        .default_nigori_key_data()
        .context("serializing explicit passphrase key")?;
    let encrypted = encryptor
        .encrypt_string(&serialized)
        .context("encrypting explicit passphrase key")?;
    Ok(STANDARD.encode(encrypted))
}

/// Inverse of [`pack_explicit_passphrase_key`]: a serialized Nigori key ready
/// for `Cryptographer::import_nigori_key`.
pub fn unpack_explicit_passphrase_key(
    encryptor: &dyn Encryptor,
    token: &str,
) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    let encrypted = STANDARD
        .decode(token)
        .context("bootstrap token is not valid base64")?;
    let serialized = encryptor
        .decrypt_string(&encrypted)
        .context("decrypting bootstrap token")?;
    Ok(Zeroizing::new(serialized))
}

// ── Bridge ────────────────────────────────────────────────────────────────────

pub struct NigoriSyncBridge {
    processor: Box<dyn NigoriLocalChangeProcessor>,
    encryptor: Arc<dyn Encryptor>,
    config: CryptoConfig,
    observers: ObserverList,

    cryptographer: Cryptographer,
    passphrase_type: PassphraseType,
    encrypt_everything: bool,
    /// Base64 of every keystore key, newest last.
    keystore_keys: Vec<SecretString>,
    /// Set whenever the passphrase type is CUSTOM.
    custom_passphrase_key_derivation_params: Option<KeyDerivationParams>,
    custom_passphrase_time: Option<SystemTime>,
    keystore_migration_time: Option<SystemTime>,
}

impl NigoriSyncBridge {
    pub fn new(
        mut processor: Box<dyn NigoriLocalChangeProcessor>,
        encryptor: Arc<dyn Encryptor>,
        config: CryptoConfig,
    ) -> Self {
        processor.model_ready_to_sync();
        Self {
            processor,
            encryptor,
            config,
            observers: ObserverList::new(),
            cryptographer: Cryptographer::new(),
            passphrase_type: PassphraseType::Unknown,
            encrypt_everything: false,
            keystore_keys: Vec::new(),
            custom_passphrase_key_derivation_params: None,
            custom_passphrase_time: None,
            keystore_migration_time: None,
        }
    }

    /// Initial sync of the account.
    ///
    /// A record without a key bag means the server has no Nigori yet: a default
    /// keystore Nigori is built from the keystore keys, staged for upload and
    /// applied locally.
    pub fn merge_sync_data(&mut self, data: Option<EntityData>) -> NigoriResult<()> {
        let Some(mut data) = data else {
            return Err(NigoriError::EmptyEntityData);
        };
        if self.keystore_keys.is_empty() {
            return Err(NigoriError::MissingKeystoreKeys);
        }
        if !blob_is_empty(data.specifics.encryption_keybag.as_ref()) {
            return self.update_local_state(&data.specifics);
        }

        let specifics = make_default_keystore_nigori(&self.keystore_keys).map_err(|e| {
            error!("failed to initialize keystore Nigori: {e:#}");
            NigoriError::KeystoreInitialization(format!("{e:#}"))
        })?;
        info!("initializing default keystore Nigori");
        data.specifics = specifics.clone();
        self.processor.put(data);
        self.update_local_state(&specifics)
    }

    /// Incremental update from the server. A deletion is a protocol error.
    pub fn apply_sync_changes(&mut self, data: Option<EntityData>) -> NigoriResult<()> {
        match data {
            Some(data) => self.update_local_state(&data.specifics),
            None => {
                warn!("server deleted the Nigori entity");
                Err(NigoriError::NigoriDeleted)
            }
        }
    }

    /// Serialize the current state for upload.
    pub fn get_data(&self) -> NigoriResult<EntityData> {
        if !self.cryptographer.is_ready() {
            return Err(NigoriError::Precondition("cryptographer is not ready"));
        }
        if self.passphrase_type == PassphraseType::Unknown {
            return Err(NigoriError::Precondition("passphrase type is unknown"));
        }

        let mut specifics = NigoriSpecifics {
            encryption_keybag: Some(self.cryptographer.get_keys()?),
            keybag_is_frozen: Some(true),
            encrypt_everything: Some(self.encrypt_everything),
            passphrase_type: Some(self.passphrase_type.to_proto()),
            ..Default::default()
        };
        if self.encrypt_everything {
            update_specifics_from_encrypted_types(&encryptable_user_types(), &mut specifics);
        }
        match self.passphrase_type {
            PassphraseType::Custom => {
                let params = self
                    .custom_passphrase_key_derivation_params
                    .as_ref()
                    .ok_or(NigoriError::Precondition(
                        "custom passphrase without derivation params",
                    ))?;
                encode_params_into_specifics(params, &mut specifics)?;
            }
            PassphraseType::Keystore => {
                let default_key = self.cryptographer.default_nigori_key_data()?;
                specifics.keystore_decryptor_token =
                    Some(self.cryptographer.encrypt_string(&default_key)?);
            }
            PassphraseType::FrozenImplicit | PassphraseType::Unknown => {}
        }
        if let Some(t) = self.keystore_migration_time {
            specifics.keystore_migration_time = Some(time_to_proto_time(t));
        }
        if let Some(t) = self.custom_passphrase_time {
            specifics.custom_passphrase_time = Some(time_to_proto_time(t));
        }
        Ok(EntityData::new(specifics))
    }

    /// The local Nigori always wins a conflict.
    pub fn resolve_conflict(&self, _local: &EntityData, _remote: &EntityData) -> ConflictResolution {
        ConflictResolution::UseLocal
    }

    /// Sync was disabled: forget keys, keystore keys and passphrase state.
    pub fn apply_disable_sync_changes(&mut self) {
        info!("sync disabled, resetting Nigori state");
        self.cryptographer = Cryptographer::new();
        self.passphrase_type = PassphraseType::Unknown;
        self.encrypt_everything = false;
        self.keystore_keys.clear();
        self.custom_passphrase_key_derivation_params = None;
        self.custom_passphrase_time = None;
        self.keystore_migration_time = None;
    }

    pub fn cryptographer(&self) -> &Cryptographer {
        &self.cryptographer
    }

    pub fn custom_passphrase_time(&self) -> Option<SystemTime> {
        self.custom_passphrase_time
    }

    /// When the current explicit passphrase was set, if there is one.
    pub fn explicit_passphrase_time(&self) -> Option<SystemTime> {
        match self.passphrase_type {
            PassphraseType::Unknown | PassphraseType::Keystore => None,
            PassphraseType::FrozenImplicit => self.keystore_migration_time,
            PassphraseType::Custom => self.custom_passphrase_time,
        }
    }

    /// Validate `specifics`, apply it, then notify observers.
    ///
    /// The Cryptographer is updated on a copy, so a rejected record leaves the
    /// bridge untouched.
    fn update_local_state(&mut self, specifics: &NigoriSpecifics) -> NigoriResult<()> {
        if !is_valid_specifics(specifics, &self.config) {
            return Err(NigoriError::InvalidSpecifics);
        }
        let new_type = PassphraseType::from_proto(specifics.passphrase_type())
            .ok_or(NigoriError::InvalidSpecifics)?;

        if !is_valid_passphrase_transition(self.passphrase_type, new_type) {
            warn!(from = %self.passphrase_type, to = %new_type, "rejecting passphrase type transition");
            return Err(NigoriError::InvalidPassphraseTransition {
                from: self.passphrase_type.to_string(),
                to: new_type.to_string(),
            });
        }
        if !is_valid_encrypted_types_transition(self.encrypt_everything, specifics) {
            warn!("rejecting Nigori that turns encrypt_everything off");
            return Err(NigoriError::InvalidEncryptedTypesTransition);
        }

        let encryption_keybag = specifics.encryption_keybag.clone().unwrap_or_default();
        let mut cryptographer = self.cryptographer.clone();
        let mut custom_params = self.custom_passphrase_key_derivation_params.clone();
        match new_type {
            PassphraseType::Keystore => {
                let token = specifics.keystore_decryptor_token.clone().unwrap_or_default();
                update_cryptographer_from_keystore_nigori(
                    &mut cryptographer,
                    &self.keystore_keys,
                    &encryption_keybag,
                    &token,
                )?;
            }
            PassphraseType::Custom => {
                custom_params = Some(derive_params_from_specifics(specifics, &self.config));
                update_cryptographer_from_explicit_passphrase_nigori(
                    &mut cryptographer,
                    &encryption_keybag,
                )?;
            }
            PassphraseType::FrozenImplicit => {
                update_cryptographer_from_explicit_passphrase_nigori(
                    &mut cryptographer,
                    &encryption_keybag,
                )?;
            }
            PassphraseType::Unknown => return Err(NigoriError::InvalidSpecifics),
        }

        let passphrase_type_changed = self.passphrase_type != new_type;
        let encrypted_types_changed = self.encrypt_everything != specifics.encrypt_everything();
        if passphrase_type_changed {
            info!(from = %self.passphrase_type, to = %new_type, "passphrase type changed");
        }
        self.passphrase_type = new_type;
        self.encrypt_everything = specifics.encrypt_everything();
        if let Some(t) = specifics.custom_passphrase_time.and_then(proto_time_to_time) {
            self.custom_passphrase_time = Some(t);
        }
        if let Some(t) = specifics.keystore_migration_time.and_then(proto_time_to_time) {
            self.keystore_migration_time = Some(t);
        }
        self.custom_passphrase_key_derivation_params = custom_params;
        self.cryptographer = cryptographer;

        if passphrase_type_changed {
            let explicit_time = self.explicit_passphrase_time();
            self.observers
                .notify(|o| o.on_passphrase_type_changed(new_type, explicit_time));
        }
        if encrypted_types_changed {
            // Only false -> true gets past validation.
            let types = encryptable_user_types();
            self.observers
                .notify(|o| o.on_encrypted_types_changed(&types, true));
        }
        self.observers
            .notify(|o| o.on_cryptographer_state_changed(&self.cryptographer));

        if let Some(pending_keys) = self.cryptographer.pending_keys() {
            let params = self.key_derivation_params_for_pending_keys()?;
            info!(passphrase_type = %self.passphrase_type, "passphrase required to decrypt pending keys");
            self.observers.notify(|o| {
                o.on_passphrase_required(PassphraseRequiredReason::Decryption, &params, pending_keys)
            });
        }
        Ok(())
    }

    fn key_derivation_params_for_pending_keys(&self) -> NigoriResult<KeyDerivationParams> {
        match self.passphrase_type {
            PassphraseType::FrozenImplicit => Ok(KeyDerivationParams::for_pbkdf2()),
            PassphraseType::Custom => self
                .custom_passphrase_key_derivation_params
                .clone()
                .ok_or(NigoriError::Precondition(
                    "custom passphrase without derivation params",
                )),
            PassphraseType::Unknown | PassphraseType::Keystore => Err(NigoriError::Precondition(
                "no passphrase can decrypt pending keys in this state",
            )),
        }
    }

    fn maybe_notify_bootstrap_token_updated(&self) {
        if !self.passphrase_type.is_explicit() {
            return;
        }
        match pack_explicit_passphrase_key(self.encryptor.as_ref(), &self.cryptographer) {
            Ok(token) => self.observers.notify(|o| {
                o.on_bootstrap_token_updated(&token, BootstrapTokenType::PassphraseBootstrapToken)
            }),
            Err(e) => debug!("skipping bootstrap token update: {e:#}"),
        }
    }

    fn report(&mut self, error: NigoriError) -> NigoriError {
        error!("{error}");
        self.processor.report_error(&error);
        error
    }
}

/// Steady state installs the key bag directly; otherwise it stays pending
/// until the key recovered from the decryptor token unlocks it.
fn update_cryptographer_from_keystore_nigori(
    cryptographer: &mut Cryptographer,
    keystore_keys: &[SecretString],
    encryption_keybag: &EncryptedData,
    keystore_decryptor_token: &EncryptedData,
) -> NigoriResult<()> {
    if cryptographer.can_decrypt(encryption_keybag) {
        cryptographer.install_keys(encryption_keybag)?;
        return Ok(());
    }

    // Initial sync, or another client rotated the keystore key.
    cryptographer.set_pending_keys(encryption_keybag.clone());
    let serialized_key = decrypt_keystore_decryptor(keystore_keys, keystore_decryptor_token)
        .map_err(|e| {
            warn!("{e:#}");
            NigoriError::KeystoreDecryptor
        })?;
    cryptographer.import_nigori_key(&serialized_key).map_err(|e| {
        warn!("importing keystore decryptor key: {e:#}");
        NigoriError::KeystoreDecryptor
    })?;
    if !cryptographer.is_ready() {
        return Err(NigoriError::KeystoreDecryptor);
    }
    Ok(())
}

/// An undecryptable key bag becomes pending; a decryptable one is always
/// re-installed since the server copy decides which keys are current.
fn update_cryptographer_from_explicit_passphrase_nigori(
    cryptographer: &mut Cryptographer,
    encryption_keybag: &EncryptedData,
) -> NigoriResult<()> {
    if !cryptographer.can_decrypt(encryption_keybag) {
        cryptographer.set_pending_keys(encryption_keybag.clone());
        return Ok(());
    }
    cryptographer.install_keys(encryption_keybag)?;
    Ok(())
}

impl SyncEncryptionHandler for NigoriSyncBridge {
    fn add_observer(&mut self, observer: Arc<dyn SyncEncryptionObserver>) {
        self.observers.add(observer);
    }

    fn remove_observer(&mut self, observer: &dyn SyncEncryptionObserver) {
        self.observers.remove(observer);
    }

    fn init(&mut self) {
        let encrypt_everything = self.encrypt_everything;
        let types = if encrypt_everything {
            encryptable_user_types()
        } else {
            sensitive_types()
        };
        self.observers
            .notify(|o| o.on_encrypted_types_changed(&types, encrypt_everything));
    }

    fn set_encryption_passphrase(&mut self, passphrase: &SecretString) -> NigoriResult<()> {
        if passphrase.expose_secret().is_empty() {
            return Err(NigoriError::Precondition("empty passphrase"));
        }
        match self.passphrase_type {
            PassphraseType::Unknown => {
                return Err(NigoriError::Precondition(
                    "cannot set a passphrase before the first sync",
                ));
            }
            PassphraseType::FrozenImplicit | PassphraseType::Custom => {
                // A server update installed an explicit passphrase meanwhile.
                debug!(
                    passphrase_type = %self.passphrase_type,
                    "explicit passphrase already set, ignoring new one"
                );
                return Ok(());
            }
            PassphraseType::Keystore => {}
        }
        if !self.cryptographer.is_ready() {
            return Err(NigoriError::Precondition("cryptographer is not ready"));
        }

        let params = if self.config.use_scrypt_for_new_passphrase() {
            KeyDerivationParams::for_scrypt(generate_scrypt_salt())
        } else {
            KeyDerivationParams::for_pbkdf2()
        };
        let mut cryptographer = self.cryptographer.clone();
        if let Err(e) = cryptographer.add_key(&params, passphrase) {
            return Err(self.report(NigoriError::Other(
                e.context("adding custom passphrase to cryptographer"),
            )));
        }

        info!(method = ?params.method(), "custom passphrase set");
        self.cryptographer = cryptographer;
        self.passphrase_type = PassphraseType::Custom;
        self.custom_passphrase_key_derivation_params = Some(params);
        self.encrypt_everything = true;
        self.custom_passphrase_time = Some(SystemTime::now());

        let entity = self.get_data()?;
        self.processor.put(entity);

        let custom_passphrase_time = self.custom_passphrase_time;
        let types = encryptable_user_types();
        self.observers.notify(|o| o.on_passphrase_accepted());
        self.observers.notify(|o| {
            o.on_passphrase_type_changed(PassphraseType::Custom, custom_passphrase_time)
        });
        self.observers
            .notify(|o| o.on_cryptographer_state_changed(&self.cryptographer));
        self.observers
            .notify(|o| o.on_encrypted_types_changed(&types, true));
        self.maybe_notify_bootstrap_token_updated();
        Ok(())
    }

    fn set_decryption_passphrase(&mut self, passphrase: &SecretString) -> NigoriResult<()> {
        if passphrase.expose_secret().is_empty() {
            return Err(NigoriError::Precondition("empty passphrase"));
        }
        if !self.cryptographer.has_pending_keys() {
            return Err(NigoriError::Precondition("no pending keys to decrypt"));
        }
        let params = self.key_derivation_params_for_pending_keys()?;

        let mut cryptographer = self.cryptographer.clone();
        if let Err(e) = cryptographer.add_key(&params, passphrase) {
            return Err(self.report(NigoriError::Other(
                e.context("adding decryption passphrase to cryptographer"),
            )));
        }
        if cryptographer.has_pending_keys() {
            info!("decryption passphrase does not unlock pending keys");
            return Err(NigoriError::WrongDecryptionPassphrase);
        }

        self.cryptographer = cryptographer;
        info!("pending keys decrypted");
        self.observers
            .notify(|o| o.on_cryptographer_state_changed(&self.cryptographer));
        self.observers.notify(|o| o.on_passphrase_accepted());
        self.maybe_notify_bootstrap_token_updated();
        Ok(())
    }

    fn enable_encrypt_everything(&mut self) -> NigoriResult<()> {
        if self.encrypt_everything {
            debug!("encrypt_everything already enabled");
            return Ok(());
        }
        self.encrypt_everything = true;
        let entity = match self.get_data() {
            Ok(entity) => entity,
            Err(e) => {
                self.encrypt_everything = false;
                return Err(e);
            }
        };
        info!("encrypt_everything enabled");
        self.processor.put(entity);

        let types = encryptable_user_types();
        self.observers
            .notify(|o| o.on_encrypted_types_changed(&types, true));
        Ok(())
    }

    fn is_encrypt_everything_enabled(&self) -> bool {
        self.encrypt_everything
    }

    fn passphrase_type(&self) -> PassphraseType {
        self.passphrase_type
    }

    fn keystore_migration_time(&self) -> Option<SystemTime> {
        self.keystore_migration_time
    }

    fn keystore_keys_handler(&mut self) -> &mut dyn KeystoreKeysHandler {
        self
    }
}

impl KeystoreKeysHandler for NigoriSyncBridge {
    fn need_keystore_key(&self) -> bool {
        self.keystore_keys.is_empty()
    }

    fn set_keystore_keys(&mut self, keys: &[Vec<u8>]) -> bool {
        match keys.last() {
            None => return false,
            Some(newest) if newest.is_empty() => return false,
            Some(_) => {}
        }
        // Keys are used base64-encoded, as passphrases.
        self.keystore_keys = keys
            .iter()
            .map(|key| SecretString::from(STANDARD.encode(key)))
            .collect();
        debug!(count = self.keystore_keys.len(), "keystore keys updated");
        true
    }
}

impl std::fmt::Debug for NigoriSyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NigoriSyncBridge")
            .field("passphrase_type", &self.passphrase_type)
            .field("encrypt_everything", &self.encrypt_everything)
            .field("keystore_keys", &self.keystore_keys.len())
            .field("cryptographer", &self.cryptographer)
            .field("observers", &self.observers)
            .finish()
    }
}
