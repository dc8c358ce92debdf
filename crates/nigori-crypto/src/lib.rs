//! nigori-crypto: key material behind the Nigori encryption state
//!
//! Key hierarchy:
//! ```text
//! Passphrase / keystore key
//!   └── KDF (PBKDF2-HMAC-SHA1 x1003, or scrypt N=8192 r=8 p=11 + salt)
//!       └── Nigori key (256-bit, named by HKDF-SHA256(key, "nigori-key-name"))
//!           └── Blob AEAD: XChaCha20-Poly1305 (nonce=random_192bit, AAD=key name)
//! ```
//!
//! A `Cryptographer` holds every known Nigori key, one of them default. The
//! full set, encrypted under the default key, is the `encryption_keybag`.

pub mod aead;
pub mod cryptographer;
pub mod encryptor;
pub mod kdf;
pub mod nigori;

pub use cryptographer::Cryptographer;
pub use encryptor::{Encryptor, LocalKeyEncryptor};
pub use kdf::{generate_scrypt_salt, KeyDerivationMethod, KeyDerivationParams};
pub use nigori::NigoriKeyMaterial;

/// Size of a Nigori key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
