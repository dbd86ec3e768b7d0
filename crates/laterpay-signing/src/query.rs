//! Signed query strings and URLs.
//!
//! These helpers sit on top of [`crate::signing`]: they assemble an
//! url-encoded query from request parameters, optionally stamp it with a `ts`
//! Unix timestamp, and append the signature as one more query parameter.
//! [`verify_signed_url`] does the reverse for URLs that come back signed.

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::config::{DEFAULT_SIGNATURE_PARAM, SigningConfig};
use crate::error::SigningResult;
use crate::method::Method;
use crate::params::RawParams;
use crate::signing::{sign_normalized, verify_normalized};
use crate::url::split_url;

/// Name of the timestamp parameter added to signed queries.
pub const TIMESTAMP_PARAM: &str = "ts";

/// Form encoding: everything except ASCII alphanumerics and `-`, `_`, `.`, `~`
/// is encoded; spaces are turned into `+` afterwards.
const FORM_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Options for [`signed_query`] and [`signed_url`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct QueryOptions {
    /// Method the signature is computed for.
    #[builder(default = Method::Get)]
    pub method: Method,

    /// Add a `ts` parameter when the params do not carry one.
    #[builder(default = true)]
    pub add_timestamp: bool,

    /// Name of the appended signature parameter.
    #[builder(default = String::from(DEFAULT_SIGNATURE_PARAM), setter(into))]
    pub signature_param_name: String,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&SigningConfig> for QueryOptions {
    fn from(config: &SigningConfig) -> Self {
        Self {
            method: Method::Get,
            add_timestamp: config.add_timestamp,
            signature_param_name: config.signature_param_name.clone(),
        }
    }
}

/// Build a signed, url-encoded query string, timestamped with the current time.
///
/// See [`signed_query_at`].
#[must_use]
pub fn signed_query(
    secret: impl AsRef<[u8]>,
    params: &RawParams,
    url: &str,
    options: &QueryOptions,
) -> String {
    signed_query_at(secret, params, url, options, Utc::now())
}

/// Build a signed, url-encoded query string.
///
/// The `(key, value)` pairs are sorted and form-encoded; the signature over
/// `params`, `url` and `options.method` is appended as
/// `&{signature_param_name}={mac}`. If `options.add_timestamp` is set and
/// `params` has no `ts`, `ts` is set to `now` in Unix seconds. A signature
/// parameter already present in `params` stays in the query but is not signed.
///
/// With nothing else to emit (empty `params` and no timestamp), the result is
/// just `{signature_param_name}={mac}`, without a leading `&`.
///
/// # Examples
///
/// ```
/// use chrono::DateTime;
/// use laterpay_signing::{signed_query_at, QueryOptions, RawParams};
///
/// let now = DateTime::from_timestamp(123, 0).unwrap();
/// let query = signed_query_at(
///     "secret",
///     &RawParams::map([("foo", "bar")]),
///     "https://endpoint.com/api",
///     &QueryOptions::default(),
///     now,
/// );
/// assert!(query.starts_with("foo=bar&ts=123&hmac="));
/// ```
#[must_use]
pub fn signed_query_at(
    secret: impl AsRef<[u8]>,
    params: &RawParams,
    url: &str,
    options: &QueryOptions,
    now: DateTime<Utc>,
) -> String {
    let mut params = params.clone();
    if options.add_timestamp && !params.contains_key(TIMESTAMP_PARAM) {
        params.push(TIMESTAMP_PARAM, now.timestamp().to_string());
    }

    let normalized = params.normalize();
    let mut pairs: Vec<(&str, &str)> = normalized
        .iter()
        .flat_map(|(key, values)| values.iter().map(move |v| (key.as_str(), v.as_str())))
        .collect();
    pairs.sort_unstable();

    let signature = sign_normalized(secret.as_ref(), &normalized, url, options.method);
    let signature_pair = [(options.signature_param_name.as_str(), signature.as_str())];

    encode_query(pairs.iter().chain(signature_pair.iter()).copied())
}

/// Build `url?{signed query}`, timestamped with the current time.
///
/// # Examples
///
/// ```
/// use laterpay_signing::{signed_url, QueryOptions, RawParams};
///
/// let options = QueryOptions::builder()
///     .add_timestamp(false)
///     .signature_param_name("sig")
///     .build();
/// let url = signed_url("secret", &RawParams::map([("foo", "bar")]), "http://example.net/here", &options);
/// assert_eq!(
///     url,
///     "http://example.net/here?foo=bar&sig=83e26a62c0a3cf7405c7f2b4b75a46c4facc5c4dd013d57fa24936ce"
/// );
/// ```
#[must_use]
pub fn signed_url(
    secret: impl AsRef<[u8]>,
    params: &RawParams,
    url: &str,
    options: &QueryOptions,
) -> String {
    signed_url_at(secret, params, url, options, Utc::now())
}

/// Build `url?{signed query}` with an explicit timestamp.
#[must_use]
pub fn signed_url_at(
    secret: impl AsRef<[u8]>,
    params: &RawParams,
    url: &str,
    options: &QueryOptions,
    now: DateTime<Utc>,
) -> String {
    format!("{url}?{}", signed_query_at(secret, params, url, options, now))
}

/// Sign an assembled GET URL, using the current time for `ts`.
///
/// See [`sign_get_url_at`].
#[must_use]
pub fn sign_get_url(
    secret: impl AsRef<[u8]>,
    url: &str,
    signature_param_name: &str,
) -> Option<String> {
    sign_get_url_at(secret, url, signature_param_name, Utc::now())
}

/// Sign an assembled GET URL.
///
/// The query is parsed (blank values kept), a `ts` pair is appended, the pairs
/// are sorted, signed for `GET`, and the signature is appended under
/// `signature_param_name`. Returns `None` when the URL has no query string.
///
/// # Examples
///
/// ```
/// use chrono::DateTime;
/// use laterpay_signing::sign_get_url_at;
///
/// let now = DateTime::from_timestamp(123, 0).unwrap();
/// let signed = sign_get_url_at("secret", "https://example.com/callback?foo=bar", "hmac", now).unwrap();
/// assert_eq!(
///     signed,
///     "https://example.com/callback?foo=bar&ts=123\
///      &hmac=46bf8b867e5947f5d07b620bc00985d40e3a8f7a1f402da7b97519e2"
/// );
/// assert!(sign_get_url_at("secret", "https://example.com/callback", "hmac", now).is_none());
/// ```
#[must_use]
pub fn sign_get_url_at(
    secret: impl AsRef<[u8]>,
    url: &str,
    signature_param_name: &str,
    now: DateTime<Utc>,
) -> Option<String> {
    let parts = split_url(url);
    if parts.query.is_empty() {
        return None;
    }

    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(parts.query.as_bytes())
        .into_owned()
        .collect();
    pairs.push((TIMESTAMP_PARAM.to_owned(), now.timestamp().to_string()));
    pairs.sort_unstable();

    let params = RawParams::multi_map(pairs.iter().cloned());
    let signature = sign_normalized(secret.as_ref(), &params.normalize(), url, Method::Get);
    pairs.push((signature_param_name.to_owned(), signature));

    let query = encode_query(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let mut signed = format!("{}?{query}", parts.resource());
    if !parts.fragment.is_empty() {
        signed.push('#');
        signed.push_str(parts.fragment);
    }

    Some(signed)
}

/// Verify a URL that carries its signature as a query parameter.
///
/// Every occurrence of `signature_param_name` is removed from the query and
/// the first one is checked against the remaining parameters. A URL without
/// the signature parameter verifies as `false`.
///
/// # Errors
///
/// Returns [`SigningError::UnsupportedMethod`](crate::SigningError::UnsupportedMethod)
/// if `method` is not allowed.
///
/// # Examples
///
/// ```
/// use chrono::DateTime;
/// use laterpay_signing::{sign_get_url_at, verify_signed_url};
///
/// let now = DateTime::from_timestamp(1_330_088_810, 0).unwrap();
/// let signed = sign_get_url_at("secret", "https://shop.example/return?article=42", "hmac", now).unwrap();
/// assert!(verify_signed_url("secret", &signed, "GET", "hmac").unwrap());
/// assert!(!verify_signed_url("other", &signed, "GET", "hmac").unwrap());
/// ```
pub fn verify_signed_url(
    secret: impl AsRef<[u8]>,
    url: &str,
    method: &str,
    signature_param_name: &str,
) -> SigningResult<bool> {
    let method: Method = method.parse()?;
    let parts = split_url(url);

    let mut signature = None;
    let mut remaining = Vec::new();
    for (key, value) in form_urlencoded::parse(parts.query.as_bytes()).into_owned() {
        if key == signature_param_name {
            signature.get_or_insert(value);
        } else {
            remaining.push((key, value));
        }
    }

    let Some(signature) = signature else {
        debug!(%method, url = %parts.base_url(), "URL carries no signature parameter");
        return Ok(false);
    };

    let params = RawParams::multi_map(remaining);
    Ok(verify_normalized(
        &signature,
        secret.as_ref(),
        &params.normalize(),
        url,
        method,
    ))
}

/// Form-encode `(key, value)` pairs as `k=v&k=v`.
fn encode_query<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .map(|(k, v)| format!("{}={}", quote_plus(k), quote_plus(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode for a form body, writing spaces as `+`.
fn quote_plus(input: &str) -> String {
    // A literal `%` is itself encoded, so `%20` only ever stands for a space.
    utf8_percent_encode(input, FORM_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}
