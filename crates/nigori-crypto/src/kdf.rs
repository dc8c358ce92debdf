//! Key derivation: passphrase → 256-bit Nigori key via PBKDF2 or scrypt

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use zeroize::Zeroizing;

use crate::KEY_SIZE;

/// PBKDF2-HMAC-SHA1 iteration count
pub const PBKDF2_ROUNDS: u32 = 1003;

/// Constant salt; the wire format never carries one for this method.
const PBKDF2_SALT: &[u8] = b"nigori-pbkdf2-hmac-sha1-1003";

/// scrypt N = 2^13 = 8192
pub const SCRYPT_LOG_N: u8 = 13;
pub const SCRYPT_R: u32 = 8;
pub const SCRYPT_P: u32 = 11;

/// Size of a freshly generated scrypt salt
pub const SCRYPT_SALT_SIZE: usize = 32;

/// Wire id of `PBKDF2_HMAC_SHA1_1003`
pub const PBKDF2_METHOD_ID: i32 = 1;
/// Wire id of `SCRYPT_8192_8_11`
pub const SCRYPT_METHOD_ID: i32 = 2;
/// Wire id of `UNSPECIFIED`, read as PBKDF2 for backwards compatibility
pub const UNSPECIFIED_METHOD_ID: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivationMethod {
    Pbkdf2HmacSha1_1003,
    Scrypt8192_8_11,
    Unsupported,
}

impl KeyDerivationMethod {
    /// Map a raw wire value. Unknown ids are `Unsupported`.
    pub fn from_proto(value: i32) -> Self {
        match value {
            UNSPECIFIED_METHOD_ID | PBKDF2_METHOD_ID => Self::Pbkdf2HmacSha1_1003,
            SCRYPT_METHOD_ID => Self::Scrypt8192_8_11,
            _ => Self::Unsupported,
        }
    }

    /// Wire id, or `None` for `Unsupported` which is never written.
    pub fn to_proto(self) -> Option<i32> {
        match self {
            Self::Pbkdf2HmacSha1_1003 => Some(PBKDF2_METHOD_ID),
            Self::Scrypt8192_8_11 => Some(SCRYPT_METHOD_ID),
            Self::Unsupported => None,
        }
    }
}

/// Everything needed to turn a passphrase into a Nigori key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDerivationParams {
    Pbkdf2,
    Scrypt { salt: Vec<u8> },
    Unsupported,
}

impl KeyDerivationParams {
    pub fn for_pbkdf2() -> Self {
        Self::Pbkdf2
    }

    pub fn for_scrypt(salt: Vec<u8>) -> Self {
        Self::Scrypt { salt }
    }

    pub fn unsupported() -> Self {
        Self::Unsupported
    }

    pub fn method(&self) -> KeyDerivationMethod {
        match self {
            Self::Pbkdf2 => KeyDerivationMethod::Pbkdf2HmacSha1_1003,
            Self::Scrypt { .. } => KeyDerivationMethod::Scrypt8192_8_11,
            Self::Unsupported => KeyDerivationMethod::Unsupported,
        }
    }

    pub fn scrypt_salt(&self) -> Option<&[u8]> {
        match self {
            Self::Scrypt { salt } => Some(salt),
            _ => None,
        }
    }
}

/// Generate a random salt for a new scrypt-derived passphrase.
pub fn generate_scrypt_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SCRYPT_SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from `passphrase` according to `params`.
pub fn derive_key(
    params: &KeyDerivationParams,
    passphrase: &SecretString,
) -> anyhow::Result<Zeroizing<[u8; KEY_SIZE]>> {
    let password = passphrase.expose_secret().as_bytes();
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);

    match params {
        KeyDerivationParams::Pbkdf2 => {
            pbkdf2_hmac::<Sha1>(password, PBKDF2_SALT, PBKDF2_ROUNDS, &mut key[..]);
        }
        KeyDerivationParams::Scrypt { salt } => {
            let scrypt_params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_SIZE)
                .map_err(|e| anyhow::anyhow!("invalid scrypt params: {e}"))?;
            scrypt::scrypt(password, salt, &scrypt_params, &mut key[..])
                .map_err(|e| anyhow::anyhow!("scrypt KDF failed: {e}"))?;
        }
        KeyDerivationParams::Unsupported => {
            anyhow::bail!("cannot derive a key with an unsupported derivation method");
        }
    }

    Ok(key)
}
