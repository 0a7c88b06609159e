pub mod cache;
pub mod string;

pub use cache::SecretCache;
pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// Keyring service name used when none is configured explicitly
pub const DEFAULT_SERVICE: &str = "rerag";

/// SecretManager resolves provider credentials.
///
/// A secret is looked up in the process environment first (which includes
/// anything loaded from a `.env` file), then in the OS keychain:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
///
/// The SecretManager also provides secret scrubbing functionality to remove
/// sensitive data from log output and error messages.
pub struct SecretManager {
    service_name: String,
}

/// Regex patterns for detecting common secret formats.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Initializes and returns the secret detection patterns.
///
/// Patterns match:
/// - OpenAI API keys: sk-[a-zA-Z0-9]{20,}
/// - Anthropic API keys: sk-ant-...
/// - Google API keys: AIza[0-9A-Za-z-_]{35}
/// - Bearer tokens: Bearer\s+[^\s]{20,}
/// - `key=` query parameters carrying a long token
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [
            // Also covers sk-proj-, sk-ant- and friends
            r"sk-[a-zA-Z0-9\-_]{20,}",
            r"AIza[0-9A-Za-z\-_]{35}",
            r"Bearer\s+[^\s]{20,}",
            r"key=[0-9A-Za-z\-_]{20,}",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Environment variables consulted for a keyring key, in priority order
pub fn env_candidates(key: &str) -> &'static [&'static str] {
    match key {
        "gemini_api_key" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "openai_api_key" => &["OPENAI_API_KEY"],
        "anthropic_api_key" => &["ANTHROPIC_API_KEY"],
        _ => &[],
    }
}

/// Keyring key holding the API key for a cloud provider
pub fn provider_secret_key(provider: &str) -> Option<&'static str> {
    match provider {
        "gemini" => Some("gemini_api_key"),
        "openai" => Some("openai_api_key"),
        "anthropic" => Some("anthropic_api_key"),
        _ => None,
    }
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

impl SecretManager {
    /// Creates a new SecretManager with the given service name.
    ///
    /// The service name is used to namespace secrets in the OS keychain.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Retrieves a secret from the environment or the OS keychain.
    ///
    /// # Arguments
    /// * `key` - The key identifying the secret (e.g., "gemini_api_key")
    ///
    /// # Errors
    /// Returns `EngineError::Config` if the secret is set nowhere, and
    /// `EngineError::KeyringError` if keychain access fails
    pub fn get_secret(&self, key: &str) -> Result<String, EngineError> {
        if let Some(value) = Self::from_env(key) {
            tracing::debug!("Resolved secret '{}' from environment", key);
            return Ok(value);
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(secret)
            }
            Err(keyring::Error::NoEntry) => Err(EngineError::Config(format!(
                "Missing credential '{}': set {} or store it in the '{}' keychain service",
                key,
                Self::describe_env(key),
                self.service_name
            ))),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Stores a secret in the OS keychain.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if keychain access fails
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.set_password(value).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    /// Deletes a secret from the OS keychain.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if keychain access fails
    pub fn delete_secret(&self, key: &str) -> Result<(), EngineError> {
        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.delete_password().map_err(|e| {
            EngineError::KeyringError(format!("Failed to delete secret '{}': {}", key, e))
        })?;

        tracing::info!("Deleted secret '{}' from keychain", key);
        Ok(())
    }

    /// Checks if a secret is available from either source.
    pub fn has_secret(&self, key: &str) -> bool {
        if Self::from_env(key).is_some() {
            return true;
        }

        let entry = match Entry::new(&self.service_name, key) {
            Ok(entry) => entry,
            Err(_) => return false,
        };

        entry.get_password().is_ok()
    }

    fn from_env(key: &str) -> Option<String> {
        env_candidates(key)
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    }

    fn describe_env(key: &str) -> String {
        let vars = env_candidates(key);
        if vars.is_empty() {
            "no environment variable".to_string()
        } else {
            vars.join(" or ")
        }
    }

    /// Scrubs secrets from text by replacing them with [REDACTED].
    ///
    /// This should be used to sanitize provider error bodies before they are
    /// logged, persisted or displayed.
    ///
    /// # Examples
    /// ```
    /// use rerag_engine::secrets::SecretManager;
    ///
    /// let manager = SecretManager::new("test");
    /// let scrubbed = manager.scrub("My API key is sk-1234567890abcdefghij");
    /// assert_eq!(scrubbed, "My API key is [REDACTED]");
    /// ```
    pub fn scrub(&self, text: &str) -> String {
        scrub(text)
    }
}

/// Free-function form of [`SecretManager::scrub`]
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();

    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }

    result
}
