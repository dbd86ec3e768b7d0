//! Canonical request signing for LaterPay merchant integrations.
//!
//! A request is signed by building a canonical message from its HTTP method,
//! its base URL and its sorted, percent-encoded parameters, then computing an
//! HMAC-SHA224 over that message with the merchant's shared secret. The
//! resulting lowercase hex digest travels with the request (usually as the
//! `hmac` query parameter) and is checked on the other side with a
//! constant-time comparison.
//!
//! # Usage
//!
//! ```rust
//! use laterpay_signing::{sign, verify, RawParams};
//!
//! let params = RawParams::map([("ts", "1330088810"), ("cp", "laternews"), ("method", "GET")]);
//! let url = "http://example.com";
//!
//! let signature = sign("401e9a684fcc49578c1f23176a730abc", &params, url, "GET").unwrap();
//! assert_eq!(signature, "f6e5b115ea9056e322c87540f12a4e6d52d717e233beff3556cf9601");
//! assert!(verify(&signature, "401e9a684fcc49578c1f23176a730abc", &params, url, "GET").unwrap());
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Canonical message construction
//! - [`compare`] - Constant-time, case-insensitive signature comparison
//! - [`config`] - Signing configuration loaded from the environment
//! - [`error`] - Signing error types
//! - [`method`] - The allowed HTTP methods
//! - [`params`] - Parameter input shapes and normalisation
//! - [`query`] - Signed query strings and URLs
//! - [`secret`] - The shared secret
//! - [`signing`] - HMAC-SHA224 signing and verification
//! - [`url`] - URL splitting

pub mod canonical;
pub mod compare;
pub mod config;
pub mod error;
pub mod method;
pub mod params;
pub mod query;
pub mod secret;
pub mod signing;
pub mod url;

pub use canonical::{RESERVED_PARAMS, build_message};
pub use compare::constant_time_eq_ignore_case;
pub use config::{DEFAULT_SIGNATURE_PARAM, SigningConfig};
pub use error::{SigningError, SigningResult};
pub use method::{ALLOWED_METHODS, Method};
pub use params::{NormalizedParams, ParamValue, RawParams, normalize};
pub use query::{
    QueryOptions, TIMESTAMP_PARAM, sign_get_url, sign_get_url_at, signed_query, signed_query_at,
    signed_url, signed_url_at, verify_signed_url,
};
pub use secret::Secret;
pub use signing::{DEFAULT_METHOD, DIGEST_HEX_LEN, Signer, sign, verify, verify_first};
