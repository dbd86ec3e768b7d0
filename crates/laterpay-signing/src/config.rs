//! Signing configuration.
//!
//! Provides [`SigningConfig`] for the shared secret and the defaults used by
//! the query helpers. Values are loaded from environment variables.

use std::fmt;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{SigningError, SigningResult};
use crate::method::Method;
use crate::secret::Secret;

/// Name of the query parameter that carries the signature.
pub const DEFAULT_SIGNATURE_PARAM: &str = "hmac";

/// Signing configuration.
///
/// # Examples
///
/// ```
/// use laterpay_signing::{Method, SigningConfig};
///
/// let config = SigningConfig::builder().shared_secret("secret").build();
/// assert_eq!(config.signature_param_name, "hmac");
/// assert!(config.add_timestamp);
/// assert_eq!(config.default_method, Method::Post);
/// ```
#[derive(Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct SigningConfig {
    /// Shared secret used as the HMAC key. Never serialized.
    #[serde(skip)]
    #[builder(default, setter(strip_option, into))]
    pub shared_secret: Option<Secret>,

    /// Query parameter name that carries the signature.
    #[builder(default = String::from(DEFAULT_SIGNATURE_PARAM), setter(into))]
    pub signature_param_name: String,

    /// Whether signed queries get a `ts` timestamp when none is present.
    #[builder(default = true)]
    pub add_timestamp: bool,

    /// Method used when the caller does not name one.
    #[builder(default)]
    pub default_method: Method,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"), setter(into))]
    pub log_level: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            shared_secret: None,
            signature_param_name: String::from(DEFAULT_SIGNATURE_PARAM),
            add_timestamp: true,
            default_method: Method::default(),
            log_level: String::from("info"),
        }
    }
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("shared_secret", &self.shared_secret.as_ref().map(|_| "<redacted>"))
            .field("signature_param_name", &self.signature_param_name)
            .field("add_timestamp", &self.add_timestamp)
            .field("default_method", &self.default_method)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl SigningConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `LATERPAY_SHARED_SECRET` | *(unset)* |
    /// | `LATERPAY_SIGNATURE_PARAM` | `hmac` |
    /// | `LATERPAY_ADD_TIMESTAMP` | `true` |
    /// | `LATERPAY_DEFAULT_METHOD` | `POST` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Config`] if `LATERPAY_DEFAULT_METHOD` is not an
    /// allowed HTTP method.
    pub fn from_env() -> SigningResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SigningResult<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("LATERPAY_SHARED_SECRET") {
            if !v.is_empty() {
                config.shared_secret = Some(Secret::from(v));
            }
        }
        if let Some(v) = lookup("LATERPAY_SIGNATURE_PARAM") {
            config.signature_param_name = v;
        }
        if let Some(v) = lookup("LATERPAY_ADD_TIMESTAMP") {
            config.add_timestamp = parse_bool(&v);
        }
        if let Some(v) = lookup("LATERPAY_DEFAULT_METHOD") {
            config.default_method = v.parse().map_err(|_| {
                SigningError::Config(format!("LATERPAY_DEFAULT_METHOD: unsupported method {v}"))
            })?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        Ok(config)
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
