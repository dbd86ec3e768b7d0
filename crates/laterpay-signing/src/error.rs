//! Error types for request signing.
//!
//! Every variant of [`SigningError`] describes a misuse of the API. A signature
//! that simply does not match is not an error: verification functions return
//! `Ok(false)` for that case and leave the policy decision to the caller.

/// Errors that can occur while building or verifying a request signature.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The parameters are neither a mapping nor a sequence of `(key, value)` pairs.
    #[error("invalid parameter input: {0}")]
    InvalidInputType(String),

    /// The HTTP method is outside the allowed set.
    #[error("unsupported HTTP method: {0} (expected one of GET, POST, PUT, DELETE, OPTIONS, HEAD)")]
    UnsupportedMethod(String),

    /// A byte-sequence parameter could not be decoded as UTF-8 text.
    #[error("parameter bytes are not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A signer was requested but no shared secret is configured.
    #[error("no shared secret configured")]
    MissingSecret,

    /// A configuration value could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience result type for signing operations.
pub type SigningResult<T> = Result<T, SigningError>;
