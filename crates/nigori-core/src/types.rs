use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::proto::sync_pb::{nigori_specifics, NigoriSpecifics};

/// Non-unique name of the single Nigori entity.
pub const NIGORI_NON_UNIQUE_NAME: &str = "Nigori";

/// Confirmed local passphrase type, ordered by increasing explicit user control.
///
/// The legacy `IMPLICIT_PASSPHRASE` wire value has no local counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PassphraseType {
    /// Nothing synced yet
    Unknown,
    /// Key material managed through server-issued keystore keys
    Keystore,
    /// Explicit passphrase inherited from a pre-keystore client
    FrozenImplicit,
    /// User-chosen custom passphrase
    Custom,
}

impl PassphraseType {
    /// Convert a raw wire value. Returns `None` for values that can never be a
    /// confirmed state: `IMPLICIT_PASSPHRASE` and anything out of range.
    pub fn from_proto(value: i32) -> Option<Self> {
        match nigori_specifics::PassphraseType::try_from(value).ok()? {
            nigori_specifics::PassphraseType::Unknown => Some(Self::Unknown),
            nigori_specifics::PassphraseType::ImplicitPassphrase => None,
            nigori_specifics::PassphraseType::KeystorePassphrase => Some(Self::Keystore),
            nigori_specifics::PassphraseType::FrozenImplicitPassphrase => {
                Some(Self::FrozenImplicit)
            }
            nigori_specifics::PassphraseType::CustomPassphrase => Some(Self::Custom),
        }
    }

    pub fn to_proto(self) -> i32 {
        let wire = match self {
            Self::Unknown => nigori_specifics::PassphraseType::Unknown,
            Self::Keystore => nigori_specifics::PassphraseType::KeystorePassphrase,
            Self::FrozenImplicit => nigori_specifics::PassphraseType::FrozenImplicitPassphrase,
            Self::Custom => nigori_specifics::PassphraseType::CustomPassphrase,
        };
        wire as i32
    }

    /// Frozen-implicit and custom passphrases are chosen by the user.
    pub fn is_explicit(self) -> bool {
        matches!(self, Self::FrozenImplicit | Self::Custom)
    }
}

impl fmt::Display for PassphraseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Keystore => "KEYSTORE_PASSPHRASE",
            Self::FrozenImplicit => "FROZEN_IMPLICIT_PASSPHRASE",
            Self::Custom => "CUSTOM_PASSPHRASE",
        };
        f.write_str(name)
    }
}

/// Why the bridge asks the user for a passphrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassphraseRequiredReason {
    /// Pending keys need a passphrase to be decrypted
    Decryption,
}

/// Kind of key packed into a bootstrap token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootstrapTokenType {
    PassphraseBootstrapToken,
}

/// Synced data categories relevant to encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelType {
    Bookmarks,
    Preferences,
    Passwords,
    AutofillProfile,
    Autofill,
    AutofillWalletMetadata,
    Themes,
    TypedUrls,
    Extensions,
    SearchEngines,
    Sessions,
    Apps,
    AppSettings,
    ExtensionSettings,
    AppNotifications,
    Dictionary,
    FaviconImages,
    FaviconTracking,
    Articles,
    AppList,
    ArcPackage,
    Printers,
    ReadingList,
    MountainShares,
    SendTabToSelf,
    WebApps,
    WifiConfigurations,
    Notes,
}

pub type ModelTypeSet = BTreeSet<ModelType>;

impl ModelType {
    pub const ALL: [ModelType; 28] = [
        ModelType::Bookmarks,
        ModelType::Preferences,
        ModelType::Passwords,
        ModelType::AutofillProfile,
        ModelType::Autofill,
        ModelType::AutofillWalletMetadata,
        ModelType::Themes,
        ModelType::TypedUrls,
        ModelType::Extensions,
        ModelType::SearchEngines,
        ModelType::Sessions,
        ModelType::Apps,
        ModelType::AppSettings,
        ModelType::ExtensionSettings,
        ModelType::AppNotifications,
        ModelType::Dictionary,
        ModelType::FaviconImages,
        ModelType::FaviconTracking,
        ModelType::Articles,
        ModelType::AppList,
        ModelType::ArcPackage,
        ModelType::Printers,
        ModelType::ReadingList,
        ModelType::MountainShares,
        ModelType::SendTabToSelf,
        ModelType::WebApps,
        ModelType::WifiConfigurations,
        ModelType::Notes,
    ];
}

/// Types that are always encrypted, regardless of encrypt_everything.
pub fn sensitive_types() -> ModelTypeSet {
    [ModelType::Passwords, ModelType::WifiConfigurations]
        .into_iter()
        .collect()
}

/// Every user type that can be encrypted (encrypt_everything covers all of them).
pub fn encryptable_user_types() -> ModelTypeSet {
    ModelType::ALL.into_iter().collect()
}

/// Write the per-type `encrypt_*` flags of `specifics` from `types`.
///
/// Sensitive types have no flag: they are encrypted unconditionally.
pub fn update_specifics_from_encrypted_types(
    types: &ModelTypeSet,
    specifics: &mut NigoriSpecifics,
) {
    let has = |t: ModelType| Some(types.contains(&t));
    specifics.encrypt_bookmarks = has(ModelType::Bookmarks);
    specifics.encrypt_preferences = has(ModelType::Preferences);
    specifics.encrypt_autofill_profile = has(ModelType::AutofillProfile);
    specifics.encrypt_autofill = has(ModelType::Autofill);
    specifics.encrypt_autofill_wallet_metadata = has(ModelType::AutofillWalletMetadata);
    specifics.encrypt_themes = has(ModelType::Themes);
    specifics.encrypt_typed_urls = has(ModelType::TypedUrls);
    specifics.encrypt_extensions = has(ModelType::Extensions);
    specifics.encrypt_search_engines = has(ModelType::SearchEngines);
    specifics.encrypt_sessions = has(ModelType::Sessions);
    specifics.encrypt_apps = has(ModelType::Apps);
    specifics.encrypt_app_settings = has(ModelType::AppSettings);
    specifics.encrypt_extension_settings = has(ModelType::ExtensionSettings);
    specifics.encrypt_app_notifications = has(ModelType::AppNotifications);
    specifics.encrypt_dictionary = has(ModelType::Dictionary);
    specifics.encrypt_favicon_images = has(ModelType::FaviconImages);
    specifics.encrypt_favicon_tracking = has(ModelType::FaviconTracking);
    specifics.encrypt_articles = has(ModelType::Articles);
    specifics.encrypt_app_list = has(ModelType::AppList);
    specifics.encrypt_arc_package = has(ModelType::ArcPackage);
    specifics.encrypt_printers = has(ModelType::Printers);
    specifics.encrypt_reading_list = has(ModelType::ReadingList);
    specifics.encrypt_mountain_shares = has(ModelType::MountainShares);
    specifics.encrypt_send_tab_to_self = has(ModelType::SendTabToSelf);
    specifics.encrypt_web_apps = has(ModelType::WebApps);
    specifics.encrypt_notes = has(ModelType::Notes);
}

/// The single Nigori entity as exchanged with the local change processor
#[derive(Debug, Clone, PartialEq)]
pub struct EntityData {
    pub specifics: NigoriSpecifics,
    pub name: String,
    pub is_folder: bool,
}

impl EntityData {
    pub fn new(specifics: NigoriSpecifics) -> Self {
        Self {
            specifics,
            name: NIGORI_NON_UNIQUE_NAME.to_string(),
            is_folder: true,
        }
    }
}

/// Outcome of a local/remote conflict on the Nigori entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    UseLocal,
    UseRemote,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passphrase_type_proto_roundtrip() {
        for t in [
            PassphraseType::Unknown,
            PassphraseType::Keystore,
            PassphraseType::FrozenImplicit,
            PassphraseType::Custom,
        ] {
            assert_eq!(PassphraseType::from_proto(t.to_proto()), Some(t));
        }
    }

    #[test]
    fn test_implicit_passphrase_has_no_local_state() {
        let implicit = nigori_specifics::PassphraseType::ImplicitPassphrase as i32;
        assert_eq!(PassphraseType::from_proto(implicit), None);
        assert_eq!(PassphraseType::from_proto(42), None);
    }

    #[test]
    fn test_passphrase_type_ordering() {
        assert!(PassphraseType::Unknown < PassphraseType::Keystore);
        assert!(PassphraseType::Keystore < PassphraseType::FrozenImplicit);
        assert!(PassphraseType::FrozenImplicit < PassphraseType::Custom);
        assert!(PassphraseType::Custom.is_explicit());
        assert!(!PassphraseType::Keystore.is_explicit());
    }

    #[test]
    fn test_sensitive_types_are_encryptable() {
        assert!(sensitive_types().is_subset(&encryptable_user_types()));
        assert_eq!(encryptable_user_types().len(), ModelType::ALL.len());
    }

    #[test]
    fn test_encrypt_flags_all_set() {
        let mut specifics = NigoriSpecifics::default();
        update_specifics_from_encrypted_types(&encryptable_user_types(), &mut specifics);
        assert_eq!(specifics.encrypt_bookmarks, Some(true));
        assert_eq!(specifics.encrypt_notes, Some(true));
        assert_eq!(specifics.encrypt_web_apps, Some(true));
        // encrypt_everything is owned by the caller
        assert_eq!(specifics.encrypt_everything, None);
    }

    #[test]
    fn test_encrypt_flags_sensitive_only() {
        let mut specifics = NigoriSpecifics::default();
        update_specifics_from_encrypted_types(&sensitive_types(), &mut specifics);
        assert_eq!(specifics.encrypt_bookmarks, Some(false));
        assert_eq!(specifics.encrypt_sessions, Some(false));
    }

    #[test]
    fn test_entity_data_defaults() {
        let entity = EntityData::new(NigoriSpecifics::default());
        assert_eq!(entity.name, "Nigori");
        assert!(entity.is_folder);
    }
}
