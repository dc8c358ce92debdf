//! Observer fan-out for encryption state changes.
//!
//! Observers are held weakly: the bridge never keeps one alive. Delivery is
//! synchronous and follows registration order.

use std::sync::{Arc, Weak};
use std::time::SystemTime;

use nigori_core::proto::sync_pb::EncryptedData;
use nigori_core::types::{BootstrapTokenType, ModelTypeSet, PassphraseRequiredReason, PassphraseType};
use nigori_crypto::{Cryptographer, KeyDerivationParams};

/// Receiver of encryption state notifications. Every callback defaults to a no-op.
pub trait SyncEncryptionObserver: Send + Sync {
    /// Pending keys need a passphrase derived with `params`.
    fn on_passphrase_required(
        &self,
        _reason: PassphraseRequiredReason,
        _params: &KeyDerivationParams,
        _pending_keys: &EncryptedData,
    ) {
    }

    fn on_passphrase_accepted(&self) {}

    /// A new locally encrypted copy of the explicit passphrase key.
    fn on_bootstrap_token_updated(&self, _token: &str, _token_type: BootstrapTokenType) {}

    fn on_encrypted_types_changed(&self, _types: &ModelTypeSet, _encrypt_everything: bool) {}

    fn on_cryptographer_state_changed(&self, _cryptographer: &Cryptographer) {}

    fn on_passphrase_type_changed(
        &self,
        _passphrase_type: PassphraseType,
        _explicit_passphrase_time: Option<SystemTime>,
    ) {
    }
}

#[derive(Default)]
pub struct ObserverList {
    observers: Vec<Weak<dyn SyncEncryptionObserver>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer`. Registering the same observer twice is a no-op.
    pub fn add(&mut self, observer: Arc<dyn SyncEncryptionObserver>) {
        self.observers.retain(|o| o.strong_count() > 0);
        if self.position(&*observer).is_none() {
            self.observers.push(Arc::downgrade(&observer));
        }
    }

    pub fn remove(&mut self, observer: &dyn SyncEncryptionObserver) {
        if let Some(index) = self.position(observer) {
            self.observers.remove(index);
        }
    }

    /// Call `f` on every live observer, in registration order.
    pub fn notify(&self, mut f: impl FnMut(&dyn SyncEncryptionObserver)) {
        for observer in self.observers.iter().filter_map(Weak::upgrade) {
            f(observer.as_ref());
        }
    }

    /// Number of observers still alive.
    pub fn len(&self) -> usize {
        self.observers.iter().filter(|o| o.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self, observer: &dyn SyncEncryptionObserver) -> Option<usize> {
        let target = observer as *const dyn SyncEncryptionObserver;
        self.observers
            .iter()
            .position(|o| std::ptr::addr_eq(o.as_ptr(), target))
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("live", &self.len())
            .finish()
    }
}
