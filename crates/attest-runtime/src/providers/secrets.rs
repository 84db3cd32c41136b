//! Credential handling for completion and embedding backends.
//!
//! A [`CredentialLookup`] names where a key may be found: a JSON config key
//! first, then an environment variable. The loaded value is wrapped in
//! [`secrecy::SecretString`] at once; it is redacted from `Debug` and
//! `Display` and must be exposed explicitly where a request is signed.
//!
//! ```ignore
//! const KEY: CredentialLookup = CredentialLookup::new("api_key", "OPENAI_API_KEY", "OpenAI API key");
//! let credential = KEY.load(&config)?;
//! request.bearer_auth(credential.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Origin of a loaded credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Environment,
    Programmatic,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Config => "config",
            CredentialSource::Environment => "environment",
            CredentialSource::Programmatic => "programmatic",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where to look for one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialLookup {
    /// Key in a provider's JSON config
    pub config_key: &'static str,

    /// Fallback environment variable
    pub env_var: &'static str,

    /// Human-readable name for errors and redacted output
    pub label: &'static str,
}

impl CredentialLookup {
    pub const fn new(config_key: &'static str, env_var: &'static str, label: &'static str) -> Self {
        Self {
            config_key,
            env_var,
            label,
        }
    }

    /// Load from `config`, falling back to the process environment.
    pub fn load(&self, config: &JsonValue) -> Result<ApiCredential, ProviderError> {
        self.load_with(config, |var| std::env::var(var).ok())
    }

    /// Load from the process environment only.
    pub fn load_env(&self) -> Result<ApiCredential, ProviderError> {
        self.load_with(&JsonValue::Null, |var| std::env::var(var).ok())
    }

    /// Load from `config`, falling back to `env` for the environment variable.
    pub fn load_with<F>(&self, config: &JsonValue, env: F) -> Result<ApiCredential, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = config.get(self.config_key).and_then(JsonValue::as_str) {
            return Ok(ApiCredential::new(value, CredentialSource::Config, self.label));
        }

        env(self.env_var)
            .map(|value| ApiCredential::new(value, CredentialSource::Environment, self.label))
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "{} required: set '{}' in config or the {} environment variable",
                    self.label, self.config_key, self.env_var
                ))
            })
    }

    /// Whether a credential could be loaded, without reading its value.
    pub fn is_available(&self, config: &JsonValue) -> bool {
        config.get(self.config_key).is_some_and(JsonValue::is_string)
            || std::env::var_os(self.env_var).is_some()
    }
}

/// A loaded credential that redacts itself in logs.
pub struct ApiCredential {
    secret: SecretString,
    source: CredentialSource,
    label: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, label: &'static str) -> Self {
        Self {
            secret: SecretString::from(value.into()),
            source,
            label,
        }
    }

    /// The raw value. Call only where the value is sent.
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("label", &self.label)
            .field("source", &self.source)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [REDACTED]", self.label, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY: CredentialLookup = CredentialLookup::new("api_key", "ATTEST_TEST_KEY", "test key");

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_debug_and_display_redact() {
        let cred = ApiCredential::new("sk-very-secret", CredentialSource::Programmatic, "OpenAI API key");

        let debug = format!("{:?}", cred);
        let display = format!("{}", cred);

        assert!(!debug.contains("sk-very-secret"));
        assert!(!display.contains("sk-very-secret"));
        assert!(display.contains("programmatic"));
        assert_eq!(cred.expose(), "sk-very-secret");
    }

    #[test]
    fn test_config_wins_over_environment() {
        let cred = KEY
            .load_with(&json!({"api_key": "from-config"}), |_| Some("from-env".to_string()))
            .unwrap();

        assert_eq!(cred.source(), CredentialSource::Config);
        assert_eq!(cred.expose(), "from-config");
    }

    #[test]
    fn test_environment_fallback() {
        let cred = KEY
            .load_with(&json!({"api_key": 42}), |var| {
                (var == "ATTEST_TEST_KEY").then(|| "from-env".to_string())
            })
            .unwrap();

        assert_eq!(cred.source(), CredentialSource::Environment);
        assert_eq!(cred.expose(), "from-env");
    }

    #[test]
    fn test_missing_credential() {
        let result = KEY.load_with(&json!({}), no_env);

        match result {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("ATTEST_TEST_KEY"));
                assert!(msg.contains("test key"));
            }
            other => panic!("expected NotConfigured, got {other:?}"),
        }
    }
}
