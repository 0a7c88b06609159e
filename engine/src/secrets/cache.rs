use crate::secrets::string::SecretString;
use crate::secrets::SecretManager;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// An in-memory cache for resolved provider credentials.
///
/// Providers read their API key on every request; this keeps those reads
/// off the OS keychain after the first lookup.
#[derive(Clone)]
pub struct SecretCache {
    manager: Arc<SecretManager>,
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretCache {
    /// Creates a new SecretCache wrapping the provided SecretManager
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self {
            manager,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a cache pre-seeded with fixed values, bypassing env and keychain
    pub fn with_values<I, K, V>(manager: Arc<SecretManager>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SecretString>,
    {
        let seeded = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            manager,
            cache: Arc::new(RwLock::new(seeded)),
        }
    }

    /// Retrieves a secret. It checks the memory cache first.
    pub fn get_secret(&self, key: &str) -> Result<SecretString, EngineError> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(secret) = cache.get(key) {
                return Ok(secret.clone());
            }
        }

        let secret = SecretString::new(self.manager.get_secret(key)?);

        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.insert(key.to_string(), secret.clone());
        }

        Ok(secret)
    }

    /// Returns true if the secret is cached or resolvable
    pub fn has_secret(&self, key: &str) -> bool {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key);
        cached || self.manager.has_secret(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_values_are_served_from_cache() {
        let cache = SecretCache::with_values(
            Arc::new(SecretManager::new("rerag-test")),
            [("gemini_api_key", "seeded")],
        );
        assert!(cache.has_secret("gemini_api_key"));
        assert_eq!(
            cache.get_secret("gemini_api_key").unwrap().unsecure(),
            "seeded"
        );
    }
}
