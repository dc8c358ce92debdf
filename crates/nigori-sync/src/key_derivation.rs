//! Key derivation parameters as carried by a custom passphrase Nigori.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use nigori_core::config::CryptoConfig;
use nigori_core::proto::sync_pb::NigoriSpecifics;
use nigori_core::types::PassphraseType;
use nigori_core::{NigoriError, NigoriResult};
use nigori_crypto::{KeyDerivationMethod, KeyDerivationParams};

/// Method named by the record, after applying the scrypt kill switch.
pub fn key_derivation_method_from_specifics(
    specifics: &NigoriSpecifics,
    config: &CryptoConfig,
) -> KeyDerivationMethod {
    let method =
        KeyDerivationMethod::from_proto(specifics.custom_passphrase_key_derivation_method());
    if method == KeyDerivationMethod::Scrypt8192_8_11
        && config.force_disable_scrypt_for_custom_passphrase
    {
        return KeyDerivationMethod::Unsupported;
    }
    method
}

/// Derivation parameters for the custom passphrase described by `specifics`.
///
/// A missing or undecodable scrypt salt yields `Unsupported`.
pub fn derive_params_from_specifics(
    specifics: &NigoriSpecifics,
    config: &CryptoConfig,
) -> KeyDerivationParams {
    match key_derivation_method_from_specifics(specifics, config) {
        KeyDerivationMethod::Pbkdf2HmacSha1_1003 => KeyDerivationParams::for_pbkdf2(),
        KeyDerivationMethod::Scrypt8192_8_11 => {
            match decode_scrypt_salt(specifics) {
                Some(salt) => KeyDerivationParams::for_scrypt(salt),
                None => {
                    tracing::warn!("scrypt Nigori carries no usable salt");
                    KeyDerivationParams::unsupported()
                }
            }
        }
        KeyDerivationMethod::Unsupported => KeyDerivationParams::unsupported(),
    }
}

/// Decoded `custom_passphrase_key_derivation_salt`, if present and valid base64.
pub fn decode_scrypt_salt(specifics: &NigoriSpecifics) -> Option<Vec<u8>> {
    let encoded = specifics.custom_passphrase_key_derivation_salt.as_deref()?;
    STANDARD.decode(encoded).ok()
}

/// Persist `params` into a custom passphrase record.
pub fn encode_params_into_specifics(
    params: &KeyDerivationParams,
    specifics: &mut NigoriSpecifics,
) -> NigoriResult<()> {
    if specifics.passphrase_type() != PassphraseType::Custom.to_proto() {
        return Err(NigoriError::Precondition(
            "derivation params are only persisted for CUSTOM_PASSPHRASE",
        ));
    }
    let method_id = params.method().to_proto().ok_or(NigoriError::Precondition(
        "cannot persist an unsupported key derivation method",
    ))?;

    specifics.custom_passphrase_key_derivation_method = Some(method_id);
    if let Some(salt) = params.scrypt_salt() {
        specifics.custom_passphrase_key_derivation_salt = Some(STANDARD.encode(salt));
    }
    Ok(())
}
