//! nigori-sync: the Nigori encryption-state sync bridge
//!
//! Consumes server Nigori records and device-local keystore keys, keeps the
//! Cryptographer in step with them, and tells observers what changed.

pub mod bridge;
pub mod handler;
pub mod key_derivation;
pub mod observer;
pub mod processor;
pub mod validation;

pub use bridge::NigoriSyncBridge;
pub use handler::{KeystoreKeysHandler, SyncEncryptionHandler};
pub use observer::{ObserverList, SyncEncryptionObserver};
pub use processor::NigoriLocalChangeProcessor;
