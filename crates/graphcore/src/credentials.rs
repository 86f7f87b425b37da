use std::collections::HashMap;
use std::sync::RwLock;

/// Lookup of externally stored secrets by logical service key
/// (e.g. `Slack`, `SendGrid`, `OpenAI`).
pub trait CredentialStore: Send + Sync {
    fn get_credential(&self, key: &str) -> Option<String>;
}

/// In-process credential store
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), value.into());
        }
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.write().ok()?.remove(key)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

impl CredentialStore for MemoryCredentials {
    fn get_credential(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .ok()?
            .get(key)
            .filter(|value| !value.is_empty())
            .cloned()
    }
}

impl FromIterator<(String, String)> for MemoryCredentials {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: RwLock::new(iter.into_iter().collect()),
        }
    }
}
