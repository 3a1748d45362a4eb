//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CART_SYNC_API_BASE_URL` - Base URL of the cart REST API (required by
//!   callers that talk to the network)
//! - `CART_SYNC_API_TOKEN` - Session bearer token for the cart API
//! - `CART_SYNC_GUEST_STORE_PATH` - Guest cart file (default: `.cart-sync/guest.json`)
//! - `CART_SYNC_GUEST_CART_KEY` - Key of the guest cart slot (default: `guest_cart`)
//! - `CART_SYNC_CURRENCY` - Display currency (default: `USD`)
//! - `CART_SYNC_MERGE_POLICY` - `sum` or `max` (default: `sum`)

use std::collections::HashMap;
use std::path::PathBuf;

use cart_sync_core::CurrencyCode;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::engine::MergePolicy;
use crate::guest::GUEST_CART_KEY;

const DEFAULT_GUEST_STORE_PATH: &str = ".cart-sync/guest.json";
const MIN_TOKEN_LENGTH: usize = 16;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote API settings, if a base URL is configured
    pub remote: Option<RemoteConfig>,
    /// File backing the guest cart
    pub guest_store_path: PathBuf,
    /// Key of the guest cart slot
    pub guest_cart_key: String,
    /// Currency used to price remote lines and format totals
    pub currency_code: CurrencyCode,
    /// How guest quantities combine with remote ones at sign-in
    pub merge_policy: MergePolicy,
}

/// Cart REST API settings.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct RemoteConfig {
    /// Base URL of the API
    pub base_url: Url,
    /// Session bearer token
    pub session_token: Option<SecretString>,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url.as_str())
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: None,
            guest_store_path: PathBuf::from(DEFAULT_GUEST_STORE_PATH),
            guest_cart_key: GUEST_CART_KEY.to_string(),
            currency_code: CurrencyCode::default(),
            merge_policy: MergePolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is invalid or the token fails
    /// validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`SyncConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(&lookup);

        let remote = match env.optional("CART_SYNC_API_BASE_URL") {
            Some(raw) => {
                let base_url = Url::parse(&raw).map_err(|e| {
                    ConfigError::InvalidEnvVar("CART_SYNC_API_BASE_URL".to_string(), e.to_string())
                })?;
                if !matches!(base_url.scheme(), "http" | "https") {
                    return Err(ConfigError::InvalidEnvVar(
                        "CART_SYNC_API_BASE_URL".to_string(),
                        format!("unsupported scheme `{}`", base_url.scheme()),
                    ));
                }
                let session_token = env
                    .optional("CART_SYNC_API_TOKEN")
                    .map(|token| {
                        validate_token(&token, "CART_SYNC_API_TOKEN")?;
                        Ok::<_, ConfigError>(SecretString::from(token))
                    })
                    .transpose()?;
                Some(RemoteConfig {
                    base_url,
                    session_token,
                })
            }
            None => None,
        };

        let currency_code = env
            .or_default("CART_SYNC_CURRENCY", "USD")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("CART_SYNC_CURRENCY".to_string(), e.to_string()))?;
        let merge_policy = env
            .or_default("CART_SYNC_MERGE_POLICY", "sum")
            .parse::<MergePolicy>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("CART_SYNC_MERGE_POLICY".to_string(), e.to_string())
            })?;

        Ok(Self {
            remote,
            guest_store_path: PathBuf::from(
                env.or_default("CART_SYNC_GUEST_STORE_PATH", DEFAULT_GUEST_STORE_PATH),
            ),
            guest_cart_key: env.or_default("CART_SYNC_GUEST_CART_KEY", GUEST_CART_KEY),
            currency_code,
            merge_policy,
        })
    }

    /// Remote settings, or an error naming the missing variable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if no base URL was configured.
    pub fn require_remote(&self) -> Result<&RemoteConfig, ConfigError> {
        self.remote
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("CART_SYNC_API_BASE_URL".to_string()))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Lookup<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Lookup<'_, F> {
    /// Get an optional variable, treating empty values as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }
}

/// Reject tokens that are short, look like placeholders, or have low entropy.
fn validate_token(value: &str, var_name: &str) -> Result<(), ConfigError> {
    if value.len() < MIN_TOKEN_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_LENGTH,
                value.len()
            ),
        ));
    }

    let lower = value.to_lowercase();
    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("looks like a placeholder (contains `{pattern}`)"),
        ));
    }

    let entropy = shannon_entropy(value);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need {MIN_ENTROPY_BITS_PER_CHAR})"
            ),
        ));
    }

    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // Token length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}
