use thiserror::Error;

pub type NigoriResult<T> = Result<T, NigoriError>;

/// Errors surfaced by the Nigori bridge to the sync engine.
///
/// Everything except `WrongDecryptionPassphrase` is fatal for the current
/// sync session; the engine is expected to stop syncing and resync.
#[derive(Debug, Error)]
pub enum NigoriError {
    #[error("received empty entity data during initial sync of Nigori")]
    EmptyEntityData,

    #[error("keystore keys are not set during first time sync")]
    MissingKeystoreKeys,

    #[error("failed to initialize keystore Nigori: {0}")]
    KeystoreInitialization(String),

    #[error("NigoriSpecifics is not valid")]
    InvalidSpecifics,

    #[error("invalid passphrase type transition: {from} -> {to}")]
    InvalidPassphraseTransition { from: String, to: String },

    #[error("invalid encrypted types transition")]
    InvalidEncryptedTypesTransition,

    #[error("failed to decrypt pending keys using the keystore decryptor token")]
    KeystoreDecryptor,

    #[error("Nigori entity was deleted by the server")]
    NigoriDeleted,

    #[error("failed to decrypt pending keys with provided explicit passphrase")]
    WrongDecryptionPassphrase,

    #[error("precondition violated: {0}")]
    Precondition(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NigoriError {
    /// Whether the user can recover by retrying (e.g. re-entering a passphrase).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, NigoriError::WrongDecryptionPassphrase)
    }
}
