//! Shared fakes for the bridge integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use nigori_core::config::CryptoConfig;
use nigori_core::proto::sync_pb::{EncryptedData, NigoriSpecifics};
use nigori_core::types::{BootstrapTokenType, EntityData, ModelTypeSet, PassphraseRequiredReason, PassphraseType};
use nigori_core::NigoriError;
use nigori_crypto::{Cryptographer, Encryptor, KeyDerivationParams, LocalKeyEncryptor};
use nigori_sync::{
    KeystoreKeysHandler, NigoriLocalChangeProcessor, NigoriSyncBridge, SyncEncryptionHandler,
    SyncEncryptionObserver,
};
use secrecy::SecretString;

// ── Processor ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Staged {
    pub puts: Vec<EntityData>,
    pub errors: Vec<String>,
}

pub struct RecordingProcessor(pub Arc<Mutex<Staged>>);

impl NigoriLocalChangeProcessor for RecordingProcessor {
    fn model_ready_to_sync(&mut self) {}

    fn put(&mut self, entity: EntityData) {
        self.0.lock().unwrap().puts.push(entity);
    }

    fn report_error(&mut self, error: &NigoriError) {
        self.0.lock().unwrap().errors.push(error.to_string());
    }
}

// ── Observer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PassphraseRequired(KeyDerivationParams),
    PassphraseAccepted,
    BootstrapTokenUpdated(BootstrapTokenType),
    EncryptedTypesChanged { encrypt_everything: bool, count: usize },
    CryptographerStateChanged { ready: bool },
    PassphraseTypeChanged(PassphraseType, Option<SystemTime>),
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    tokens: Mutex<Vec<String>>,
    pending_keys: Mutex<Option<EncryptedData>>,
}

impl Recorder {
    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn last_token(&self) -> Option<String> {
        self.tokens.lock().unwrap().last().cloned()
    }

    pub fn last_pending_keys(&self) -> Option<EncryptedData> {
        self.pending_keys.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl SyncEncryptionObserver for Recorder {
    fn on_passphrase_required(
        &self,
        reason: PassphraseRequiredReason,
        params: &KeyDerivationParams,
        pending_keys: &EncryptedData,
    ) {
        assert_eq!(reason, PassphraseRequiredReason::Decryption);
        *self.pending_keys.lock().unwrap() = Some(pending_keys.clone());
        self.push(Event::PassphraseRequired(params.clone()));
    }

    fn on_passphrase_accepted(&self) {
        self.push(Event::PassphraseAccepted);
    }

    fn on_bootstrap_token_updated(&self, token: &str, token_type: BootstrapTokenType) {
        self.tokens.lock().unwrap().push(token.to_string());
        self.push(Event::BootstrapTokenUpdated(token_type));
    }

    fn on_encrypted_types_changed(&self, types: &ModelTypeSet, encrypt_everything: bool) {
        self.push(Event::EncryptedTypesChanged {
            encrypt_everything,
            count: types.len(),
        });
    }

    fn on_cryptographer_state_changed(&self, cryptographer: &Cryptographer) {
        self.push(Event::CryptographerStateChanged {
            ready: cryptographer.is_ready(),
        });
    }

    fn on_passphrase_type_changed(&self, passphrase_type: PassphraseType, time: Option<SystemTime>) {
        self.push(Event::PassphraseTypeChanged(passphrase_type, time));
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct Device {
    pub bridge: NigoriSyncBridge,
    pub staged: Arc<Mutex<Staged>>,
    pub recorder: Arc<Recorder>,
    pub encryptor: Arc<LocalKeyEncryptor>,
}

impl Device {
    pub fn new(config: CryptoConfig) -> Self {
        let staged = Arc::new(Mutex::new(Staged::default()));
        let encryptor = Arc::new(LocalKeyEncryptor::generate());
        let mut bridge = NigoriSyncBridge::new(
            Box::new(RecordingProcessor(staged.clone())),
            encryptor.clone(),
            config,
        );
        let recorder = Arc::new(Recorder::default());
        bridge.add_observer(recorder.clone());
        Self {
            bridge,
            staged,
            recorder,
            encryptor,
        }
    }

    /// A device that knows `keystore_keys` but has not synced Nigori yet.
    pub fn with_keystore_keys(keystore_keys: &[&[u8]]) -> Self {
        let mut device = Self::new(CryptoConfig::default());
        let keys: Vec<Vec<u8>> = keystore_keys.iter().map(|k| k.to_vec()).collect();
        assert!(device.bridge.set_keystore_keys(&keys));
        device
    }

    /// A device whose first sync initialized a default keystore Nigori.
    pub fn synced_keystore(keystore_keys: &[&[u8]]) -> Self {
        let mut device = Self::with_keystore_keys(keystore_keys);
        device
            .bridge
            .merge_sync_data(Some(EntityData::new(NigoriSpecifics::default())))
            .unwrap();
        device.recorder.take();
        device
    }

    pub fn last_put(&self) -> EntityData {
        self.staged.lock().unwrap().puts.last().cloned().unwrap()
    }

    pub fn put_count(&self) -> usize {
        self.staged.lock().unwrap().puts.len()
    }

    pub fn error_count(&self) -> usize {
        self.staged.lock().unwrap().errors.len()
    }

    pub fn encryptor(&self) -> &dyn Encryptor {
        self.encryptor.as_ref()
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

/// A keystore key as the bridge uses it: base64, as a PBKDF2 passphrase.
pub fn keystore_passphrase(raw: &[u8]) -> SecretString {
    SecretString::from(STANDARD.encode(raw))
}

pub fn cryptographer_for(passphrase: &str) -> Cryptographer {
    let mut cryptographer = Cryptographer::new();
    cryptographer
        .add_key(&KeyDerivationParams::for_pbkdf2(), &SecretString::from(passphrase))
        .unwrap();
    cryptographer
}

/// An explicit passphrase record whose key bag is encrypted under `passphrase`.
pub fn explicit_record(passphrase_type: PassphraseType, passphrase: &str) -> NigoriSpecifics {
    NigoriSpecifics {
        encryption_keybag: Some(cryptographer_for(passphrase).get_keys().unwrap()),
        keybag_is_frozen: Some(true),
        passphrase_type: Some(passphrase_type.to_proto()),
        encrypt_everything: Some(true),
        keystore_migration_time: Some(1_500_000_000_000),
        custom_passphrase_time: Some(1_600_000_000_000),
        ..Default::default()
    }
}
