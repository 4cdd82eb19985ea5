use std::collections::BTreeMap;

use mailshelter_error::ShelterError;

const REQUIRED_KEYS: &[&str] = &[
    "user-id",
    "access-token",
    "os-type",
    "application-version",
    "terms-version",
];

const OPTIONAL_KEYS: &[&str] = &[
    "user-agent",
    "accept-encoding",
    "accept",
    "accept-language",
    "application-language",
    "device-version",
    "os-version",
];

/// Validated, case-insensitive map of the request headers identifying one
/// recipient profile. Keys outside the recognized set are rejected at
/// construction; the required subset must all be present. Immutable for the
/// duration of a run.
#[derive(Debug, Clone)]
pub struct Profile {
    store: BTreeMap<String, String>,
}

impl Profile {
    pub fn new<I, K, V>(entries: I) -> Result<Self, ShelterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut store = BTreeMap::new();
        for (key, value) in entries {
            let key = key.as_ref().to_ascii_lowercase();
            if !Self::is_valid_key(&key) {
                return Err(ShelterError::config(format!(
                    "unknown key '{key}' in 'profile'"
                )));
            }
            store.insert(key, value.into());
        }
        for key in REQUIRED_KEYS {
            if !store.contains_key(*key) {
                return Err(ShelterError::config(format!(
                    "missing required key '{key}' in 'profile'"
                )));
            }
        }
        Ok(Self { store })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.store.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.store.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn required_keys() -> &'static [&'static str] {
        REQUIRED_KEYS
    }

    pub fn is_required_key(key: &str) -> bool {
        REQUIRED_KEYS.contains(&key.to_ascii_lowercase().as_str())
    }

    pub fn is_valid_key(key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        REQUIRED_KEYS.contains(&key.as_str()) || OPTIONAL_KEYS.contains(&key.as_str())
    }
}
