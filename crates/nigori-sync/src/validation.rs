//! Consistency checks for received Nigori records and for the transitions
//! they imply. Protection never relaxes: passphrase types only move towards
//! more explicit user control and encrypt_everything never turns off.

use nigori_core::config::CryptoConfig;
use nigori_core::proto::sync_pb::{EncryptedData, NigoriSpecifics};
use nigori_core::types::PassphraseType;
use nigori_crypto::KeyDerivationMethod;

use crate::key_derivation::{decode_scrypt_salt, key_derivation_method_from_specifics};

pub(crate) fn blob_is_empty(data: Option<&EncryptedData>) -> bool {
    data.map_or(true, |d| d.blob().is_empty())
}

fn has_valid_key_derivation_params(specifics: &NigoriSpecifics, config: &CryptoConfig) -> bool {
    match key_derivation_method_from_specifics(specifics, config) {
        KeyDerivationMethod::Pbkdf2HmacSha1_1003 => true,
        KeyDerivationMethod::Scrypt8192_8_11 => {
            if specifics.custom_passphrase_key_derivation_salt.is_none() {
                tracing::warn!("scrypt Nigori is missing its key derivation salt");
                return false;
            }
            if decode_scrypt_salt(specifics).is_none() {
                tracing::warn!("key derivation salt is not valid base64");
                return false;
            }
            true
        }
        KeyDerivationMethod::Unsupported => {
            tracing::warn!(
                method = specifics.custom_passphrase_key_derivation_method(),
                "unsupported key derivation method"
            );
            false
        }
    }
}

/// Whether a non-default record (one with a key bag) is internally consistent.
pub fn is_valid_specifics(specifics: &NigoriSpecifics, config: &CryptoConfig) -> bool {
    if blob_is_empty(specifics.encryption_keybag.as_ref()) {
        tracing::warn!("Nigori has an empty encryption_keybag");
        return false;
    }
    let Some(raw_type) = specifics.passphrase_type else {
        tracing::warn!("Nigori has no passphrase_type");
        return false;
    };

    match PassphraseType::from_proto(raw_type) {
        None => {
            tracing::warn!(passphrase_type = raw_type, "IMPLICIT or unrecognized passphrase type");
            false
        }
        Some(PassphraseType::Unknown) => {
            tracing::warn!("Nigori has UNKNOWN passphrase type");
            false
        }
        Some(PassphraseType::Keystore) => {
            if blob_is_empty(specifics.keystore_decryptor_token.as_ref()) {
                tracing::warn!("keystore Nigori is missing keystore_decryptor_token");
                return false;
            }
            true
        }
        Some(explicit @ (PassphraseType::FrozenImplicit | PassphraseType::Custom)) => {
            if explicit == PassphraseType::Custom
                && !has_valid_key_derivation_params(specifics, config)
            {
                return false;
            }
            if !specifics.encrypt_everything() {
                tracing::warn!(passphrase_type = %explicit, "explicit passphrase Nigori must encrypt everything");
                return false;
            }
            true
        }
    }
}

/// Partial order of passphrase types.
///
/// `new` is assumed to come from a valid record, so it is never `Unknown`.
pub fn is_valid_passphrase_transition(old: PassphraseType, new: PassphraseType) -> bool {
    if old == new {
        return true;
    }
    match old {
        PassphraseType::Unknown => true,
        PassphraseType::Keystore | PassphraseType::FrozenImplicit => new == PassphraseType::Custom,
        PassphraseType::Custom => false,
    }
}

/// encrypt_everything may be switched on but never off.
pub fn is_valid_encrypted_types_transition(
    old_encrypt_everything: bool,
    specifics: &NigoriSpecifics,
) -> bool {
    specifics.encrypt_everything() || !old_encrypt_everything
}
