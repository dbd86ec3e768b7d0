//! HMAC-SHA224 signing and verification.
//!
//! The flow for both operations is:
//!
//! 1. Normalise the parameters into a `key -> [values]` mapping.
//! 2. Reduce the URL to `scheme://netloc/path`.
//! 3. Build the canonical message (see [`crate::canonical`]).
//! 4. Compute HMAC-SHA224 keyed by the shared secret, hex-encoded lowercase.
//!
//! Verification recomputes the MAC and compares it to the supplied signature
//! in constant time. A mismatch is reported as `Ok(false)`; errors are reserved
//! for unsupported methods.

use hmac::{Hmac, KeyInit, Mac};
use sha2::Sha224;
use tracing::{debug, trace};

use crate::canonical::build_message_for;
use crate::compare::constant_time_eq_ignore_case;
use crate::config::SigningConfig;
use crate::error::{SigningError, SigningResult};
use crate::method::Method;
use crate::params::{NormalizedParams, RawParams};
use crate::secret::Secret;
use crate::url::split_url;

/// Length of a hex-encoded HMAC-SHA224 digest.
pub const DIGEST_HEX_LEN: usize = 56;

/// Method used by callers that do not name one.
pub const DEFAULT_METHOD: Method = Method::Post;

type HmacSha224 = Hmac<Sha224>;

/// Compute the lowercase hex HMAC-SHA224 of `message` keyed by `secret`.
///
/// # Examples
///
/// ```
/// use laterpay_signing::signing::{compute_mac, DIGEST_HEX_LEN};
///
/// let mac = compute_mac(b"secret", "GET&http%3A%2F%2Fexample.com&");
/// assert_eq!(mac.len(), DIGEST_HEX_LEN);
/// assert_eq!(mac, mac.to_ascii_lowercase());
/// ```
#[must_use]
pub fn compute_mac(secret: &[u8], message: &str) -> String {
    let mut mac = HmacSha224::new_from_slice(secret).expect("HMAC can accept keys of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes().as_slice())
}

/// Sign `params` for a request to `url` with `method`.
///
/// Any query string, fragment or `;params` on `url` are ignored. The reserved
/// parameters `hmac` and `gettoken` are not signed.
///
/// # Errors
///
/// Returns [`SigningError::UnsupportedMethod`] if `method` is not allowed.
///
/// # Examples
///
/// ```
/// use laterpay_signing::{sign, ParamValue, RawParams};
///
/// let params = RawParams::map([
///     ("parĄm1", ParamValue::from("valuĘ")),
///     ("param2", ParamValue::from(["value2", "value3"])),
/// ]);
/// let mac = sign("secret", &params, "https://endpoint.com/api", "POST").unwrap();
/// assert_eq!(mac, "346f3d53ad762f3ed3fb7f2427dec2bbfaf0338bb7f91f0460aff15c");
/// ```
pub fn sign(
    secret: impl AsRef<[u8]>,
    params: &RawParams,
    url: &str,
    method: &str,
) -> SigningResult<String> {
    let method: Method = method.parse()?;
    Ok(sign_normalized(secret.as_ref(), &params.normalize(), url, method))
}

/// Verify `signature` against the MAC of `params`, `url` and `method`.
///
/// Returns `Ok(false)` when the signature does not match.
///
/// # Errors
///
/// Returns [`SigningError::UnsupportedMethod`] if `method` is not allowed.
///
/// # Examples
///
/// ```
/// use laterpay_signing::{verify, RawParams};
///
/// let params = RawParams::map([
///     ("ts", "1330088810"),
///     ("cp", "laternews"),
///     ("method", "GET"),
///     ("hmac", "f6e5b115ea9056e322c87540f12a4e6d52d717e233beff3556cf9601"),
/// ]);
/// let signature = "f6e5b115ea9056e322c87540f12a4e6d52d717e233beff3556cf9601";
/// let secret = "401e9a684fcc49578c1f23176a730abc";
/// assert!(verify(signature, secret, &params, "http://example.com", "GET").unwrap());
/// ```
pub fn verify(
    signature: &str,
    secret: impl AsRef<[u8]>,
    params: &RawParams,
    url: &str,
    method: &str,
) -> SigningResult<bool> {
    let method: Method = method.parse()?;
    Ok(verify_normalized(
        signature,
        secret.as_ref(),
        &params.normalize(),
        url,
        method,
    ))
}

/// Verify the first of several candidate signatures.
///
/// Multi-valued query parameters hand over every value of the signature
/// parameter; only the first one is checked. No candidates verifies as `false`.
///
/// # Errors
///
/// Returns [`SigningError::UnsupportedMethod`] if `method` is not allowed.
pub fn verify_first<I, S>(
    signatures: I,
    secret: impl AsRef<[u8]>,
    params: &RawParams,
    url: &str,
    method: &str,
) -> SigningResult<bool>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let method: Method = method.parse()?;
    let Some(signature) = signatures.into_iter().next() else {
        debug!(%method, url, "No signature supplied");
        return Ok(false);
    };

    Ok(verify_normalized(
        signature.as_ref(),
        secret.as_ref(),
        &params.normalize(),
        url,
        method,
    ))
}

/// Sign already normalised parameters.
pub(crate) fn sign_normalized(
    secret: &[u8],
    params: &NormalizedParams,
    url: &str,
    method: Method,
) -> String {
    let base_url = split_url(url).base_url();
    let message = build_message_for(params, &base_url, method);

    trace!(%method, url = %base_url, canonical_message = %message, "Built canonical message");

    compute_mac(secret, &message)
}

/// Verify a signature over already normalised parameters.
pub(crate) fn verify_normalized(
    signature: &str,
    secret: &[u8],
    params: &NormalizedParams,
    url: &str,
    method: Method,
) -> bool {
    let expected = sign_normalized(secret, params, url, method);
    let valid = constant_time_eq_ignore_case(signature, &expected);

    if valid {
        debug!(%method, url, "Signature verification succeeded");
    } else {
        debug!(%method, url, "Signature mismatch");
    }
    valid
}

/// A signer bound to one shared secret.
///
/// `Signer` is immutable and can be shared across threads; every call is an
/// independent computation.
///
/// # Examples
///
/// ```
/// use laterpay_signing::{Method, RawParams, Signer};
///
/// let signer = Signer::new("secret");
/// let params = RawParams::map([("a", "1"), ("b", "2")]);
/// let mac = signer.sign(&params, "https://endpoint.com/api", Method::Post);
/// assert!(signer.verify(&mac, &params, "https://endpoint.com/api", Method::Post));
/// ```
#[derive(Debug, Clone)]
pub struct Signer {
    secret: Secret,
}

impl Signer {
    /// Create a signer for `secret`.
    pub fn new(secret: impl Into<Secret>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Create a signer from the configured shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::MissingSecret`] if no non-empty secret is configured.
    pub fn from_config(config: &SigningConfig) -> SigningResult<Self> {
        match &config.shared_secret {
            Some(secret) if !secret.is_empty() => Ok(Self::new(secret.clone())),
            _ => Err(SigningError::MissingSecret),
        }
    }

    /// The secret this signer uses.
    #[must_use]
    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    /// The canonical message for `params`, `url` and `method`, after URL reduction.
    #[must_use]
    pub fn message(&self, params: &RawParams, url: &str, method: Method) -> String {
        let base_url = split_url(url).base_url();
        build_message_for(&params.normalize(), &base_url, method)
    }

    /// Sign `params` for a request to `url` with `method`.
    #[must_use]
    pub fn sign(&self, params: &RawParams, url: &str, method: Method) -> String {
        sign_normalized(self.secret.as_bytes(), &params.normalize(), url, method)
    }

    /// Verify `signature` for `params`, `url` and `method`.
    #[must_use]
    pub fn verify(&self, signature: &str, params: &RawParams, url: &str, method: Method) -> bool {
        verify_normalized(
            signature,
            self.secret.as_bytes(),
            &params.normalize(),
            url,
            method,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;

    const SECRET: &str = "secret";
    const URL: &str = "https://endpoint.com/api";
    const UNICODE_VECTOR: &str = "346f3d53ad762f3ed3fb7f2427dec2bbfaf0338bb7f91f0460aff15c";

    fn unicode_params() -> RawParams {
        RawParams::map([
            ("parĄm1", ParamValue::from("valuĘ")),
            ("param2", ParamValue::from(["value2", "value3"])),
        ])
    }

    fn url_verification_params() -> RawParams {
        RawParams::map([
            ("ts", "1330088810"),
            ("cp", "laternews"),
            ("method", "GET"),
            ("hmac", "f6e5b115ea9056e322c87540f12a4e6d52d717e233beff3556cf9601"),
        ])
    }

    #[test]
    fn test_should_match_known_vector_for_unicode_params() {
        let mac = sign(SECRET, &unicode_params(), URL, "POST").unwrap();
        assert_eq!(mac, UNICODE_VECTOR);
        assert_eq!(mac.len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn test_should_match_known_vector_for_ascii_params() {
        let params = RawParams::map([
            ("paAm1", ParamValue::from("valuE")),
            ("param2", ParamValue::from(["value2", "value3"])),
        ]);
        let mac = sign(SECRET, &params, URL, DEFAULT_METHOD.as_str()).unwrap();
        assert_eq!(mac, "72d05b258ade9c886e3cbecd08455a437af82ee3e2442e4ac9464443");
    }

    #[test]
    fn test_should_match_known_vector_for_empty_params() {
        let mac = sign(SECRET, &RawParams::default(), URL, "GET").unwrap();
        assert_eq!(mac, "9a32025de8177d2a1b593d4b44ba57e493f6ed8c7ef1fa42fdcd1139");
    }

    #[test]
    fn test_should_accept_secret_as_bytes() {
        let from_text = sign(SECRET, &unicode_params(), URL, "POST").unwrap();
        let from_bytes = sign(SECRET.as_bytes(), &unicode_params(), URL, "POST").unwrap();
        let from_secret = sign(Secret::from(SECRET), &unicode_params(), URL, "POST").unwrap();
        assert_eq!(from_text, from_bytes);
        assert_eq!(from_text, from_secret);
    }

    #[test]
    fn test_should_be_order_independent() {
        let ab = RawParams::pairs([("a", "1"), ("b", "2")]);
        let ba = RawParams::pairs([("b", "2"), ("a", "1")]);
        assert_eq!(
            sign(SECRET, &ab, URL, "POST").unwrap(),
            sign(SECRET, &ba, URL, "POST").unwrap()
        );
    }

    #[test]
    fn test_should_ignore_url_query_fragment_and_params() {
        let params = RawParams::map([("k", ParamValue::from(["x y", "z~*"]))]);
        let bare = sign(SECRET, &params, URL, "PUT").unwrap();
        let decorated = sign(SECRET, &params, "https://endpoint.com/api;p?q#frag", "PUT").unwrap();

        assert_eq!(bare, "3cbd385afa8b42b64ed27aec81a9d36cd084bfaa92bbe72c33112f16");
        assert_eq!(bare, decorated);
    }

    #[test]
    fn test_should_keep_semicolon_for_schemes_without_params() {
        let empty = RawParams::default();
        let custom = sign(SECRET, &empty, "custom://h/a;b?x#y", "GET").unwrap();

        assert_eq!(custom, "14a0c2231571d700ca05d95f3a04b072c5457436faaf28d2efcac1a6");
        assert_ne!(custom, sign(SECRET, &empty, "custom://h/a", "GET").unwrap());
        assert_eq!(
            sign(SECRET, &empty, "https://h/a;b", "GET").unwrap(),
            "be51719b35cdb75a43efeef3c9482ab2816b170f6802fb0ef1c272f0"
        );
    }

    #[test]
    fn test_should_match_known_vector_for_json_boolean() {
        let params = RawParams::from_json(&serde_json::json!({"flag": true})).unwrap();
        let mac = sign(SECRET, &params, "https://e.com", "GET").unwrap();
        assert_eq!(mac, "6aab1beffaa98e42f2790067db5dc201c03b7eedc87cd0608b258b13");
    }

    #[test]
    fn test_should_match_known_vector_for_typed_scalars() {
        let typed = RawParams::map([
            ("flag", ParamValue::from(false)),
            ("big", ParamValue::from(1e20_f64)),
            ("half", ParamValue::from(0.5_f64)),
            ("one", ParamValue::from(1.0_f64)),
            ("tiny", ParamValue::from(1.5e-5_f64)),
        ]);
        let json = RawParams::from_json(&serde_json::json!({
            "flag": false,
            "big": 1e20,
            "half": 0.5,
            "one": 1.0,
            "tiny": 1.5e-5
        }))
        .unwrap();

        assert_eq!(
            Signer::new(SECRET).message(&typed, "https://e.com", Method::Get),
            "GET&https%3A%2F%2Fe.com&big%3D1e%252B20%26flag%3DFalse%26half%3D0.5%26one%3D1.0%26tiny%3D1.5e-05"
        );
        for params in [typed, json] {
            assert_eq!(
                sign(SECRET, &params, "https://e.com", "GET").unwrap(),
                "328bf5357161c61067ac79dfe67694556001ebf9852385e7f4e7ab35"
            );
        }
    }

    #[test]
    fn test_should_match_known_vector_for_mixed_json_list() {
        let params = RawParams::from_json(&serde_json::json!({"n": [1, 2.5, true]})).unwrap();
        assert_eq!(
            sign(SECRET, &params, "https://e.com", "GET").unwrap(),
            "00a47e1b1146a18444f7c0d587248cf81479fc698e687ba28ac0926d"
        );
    }

    #[test]
    fn test_should_not_change_mac_for_reserved_params_nor_mutate_input() {
        let plain = RawParams::map([("a", "1"), ("b", "2")]);
        let with_reserved = RawParams::map([("a", "1"), ("b", "2"), ("hmac", "x"), ("gettoken", "y")]);
        let before = with_reserved.clone();

        assert_eq!(
            sign(SECRET, &plain, URL, "GET").unwrap(),
            sign(SECRET, &with_reserved, URL, "GET").unwrap()
        );
        assert_eq!(with_reserved, before);
    }

    #[test]
    fn test_should_verify_lowercase_and_uppercase_signature() {
        let params = unicode_params();
        assert!(verify(UNICODE_VECTOR, SECRET, &params, URL, "POST").unwrap());
        assert!(verify(&UNICODE_VECTOR.to_ascii_uppercase(), SECRET, &params, URL, "post").unwrap());
    }

    #[test]
    fn test_should_reject_invalid_unicode_signature() {
        let forged = "Ɛ".repeat(DIGEST_HEX_LEN);
        assert!(!verify(&forged, SECRET, &RawParams::default(), URL, "POST").unwrap());
    }

    #[test]
    fn test_should_verify_url_with_embedded_hmac_param() {
        let secret = "401e9a684fcc49578c1f23176a730abc";
        let url = "http://example.com";
        let params = url_verification_params();
        let signature = "f6e5b115ea9056e322c87540f12a4e6d52d717e233beff3556cf9601";

        assert!(verify(signature, secret, &params, url, "GET").unwrap());
        assert!(!verify("e9a684fcc23176a730abc49578c1f13b", secret, &params, url, "GET").unwrap());

        let RawParams::Map(entries) = url_verification_params() else {
            unreachable!()
        };

        let mut without_cp = entries.clone();
        without_cp.remove("cp");
        assert!(!verify(signature, secret, &RawParams::Map(without_cp), url, "GET").unwrap());

        let mut changed_ts = entries;
        changed_ts.insert("ts".to_owned(), ParamValue::from("1234567890"));
        assert!(!verify(signature, secret, &RawParams::Map(changed_ts), url, "GET").unwrap());
    }

    #[test]
    fn test_should_detect_tampering() {
        let params = RawParams::map([("a", "1"), ("b", "2")]);
        let mac = sign(SECRET, &params, URL, "POST").unwrap();

        assert!(verify(&mac, SECRET, &params, URL, "POST").unwrap());
        assert!(!verify(&mac, SECRET, &params, "https://endpoint.com/apI", "POST").unwrap());
        assert!(!verify(&mac, SECRET, &RawParams::map([("a", "1"), ("b", "3")]), URL, "POST").unwrap());
        assert!(!verify(&mac, SECRET, &params, URL, "PUT").unwrap());
        assert!(!verify(&mac, "secreT", &params, URL, "POST").unwrap());
    }

    #[test]
    fn test_should_round_trip_for_every_method() {
        let params = unicode_params();
        for method in ["GET", "POST", "PUT", "DELETE", "OPTIONS", "HEAD"] {
            let mac = sign(SECRET, &params, URL, method).unwrap();
            assert!(verify(&mac, SECRET, &params, URL, method).unwrap(), "{method}");
        }
    }

    #[test]
    fn test_should_use_only_first_candidate_signature() {
        let params = unicode_params();
        assert!(verify_first([UNICODE_VECTOR, "bogus"], SECRET, &params, URL, "POST").unwrap());
        assert!(!verify_first(["bogus", UNICODE_VECTOR], SECRET, &params, URL, "POST").unwrap());
        assert!(!verify_first(Vec::<String>::new(), SECRET, &params, URL, "POST").unwrap());
    }

    #[test]
    fn test_should_reject_unsupported_method_in_sign_and_verify() {
        let params = unicode_params();
        assert!(matches!(
            sign(SECRET, &params, URL, "PATCH"),
            Err(SigningError::UnsupportedMethod(_))
        ));
        assert!(matches!(
            verify(UNICODE_VECTOR, SECRET, &params, URL, "PATCH"),
            Err(SigningError::UnsupportedMethod(_))
        ));
        assert!(matches!(
            verify_first([UNICODE_VECTOR], SECRET, &params, URL, "PATCH"),
            Err(SigningError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_should_sign_through_signer_like_free_functions() {
        let signer = Signer::new(SECRET);
        let params = unicode_params();

        assert_eq!(signer.sign(&params, URL, Method::Post), UNICODE_VECTOR);
        assert!(signer.verify(UNICODE_VECTOR, &params, URL, Method::Post));
        assert!(
            signer
                .message(&params, "https://endpoint.com/api?ignored=1", Method::Post)
                .starts_with("POST&https%3A%2F%2Fendpoint.com%2Fapi&")
        );
    }

    #[test]
    fn test_should_build_signer_from_config() {
        let config = SigningConfig::builder().shared_secret(SECRET).build();
        let signer = Signer::from_config(&config).unwrap();
        assert_eq!(signer.secret().as_bytes(), SECRET.as_bytes());

        let missing = Signer::from_config(&SigningConfig::default());
        assert!(matches!(missing, Err(SigningError::MissingSecret)));
    }

    #[test]
    fn test_should_sign_concurrently_with_shared_signer() {
        let signer = std::sync::Arc::new(Signer::new(SECRET));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let signer = std::sync::Arc::clone(&signer);
                std::thread::spawn(move || signer.sign(&unicode_params(), URL, Method::Post))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), UNICODE_VECTOR);
        }
    }
}
