//! Canonical message construction.
//!
//! The message that gets signed has the form:
//!
//! ```text
//! METHOD&ENCODED_URL&ENCODED_PARAM_BLOCK
//! ```
//!
//! where `ENCODED_PARAM_BLOCK` is the percent-encoding of
//! `k1=v1&k2=v2&...`, built from individually percent-encoded keys and values
//! sorted as `(key, value)` pairs. The parameter block is therefore encoded
//! twice. Existing signers and verifiers depend on this exact layout.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::error::SigningResult;
use crate::method::Method;
use crate::params::NormalizedParams;

/// Parameter names that are never part of the signed message.
pub const RESERVED_PARAMS: [&str; 2] = ["hmac", "gettoken"];

/// Everything except ASCII alphanumerics and `-`, `_`, `.`, `~` is encoded,
/// including `/`.
const SAFE_EMPTY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Build the canonical message for `params`, `url` and `method`.
///
/// `url` must already be reduced to scheme, host and path; no query string is
/// stripped here. The reserved parameters `hmac` and `gettoken` are skipped.
///
/// # Errors
///
/// Returns [`SigningError::UnsupportedMethod`](crate::SigningError::UnsupportedMethod)
/// if `method` is not one of the allowed HTTP methods.
///
/// # Examples
///
/// ```
/// use laterpay_signing::{build_message, ParamValue, RawParams};
///
/// let params = RawParams::map([
///     ("paAm1", ParamValue::from("valuE")),
///     ("param2", ParamValue::from(["value2", "value3"])),
/// ]);
/// let message = build_message(&params.normalize(), "https://endpoint.com/api", "post").unwrap();
/// assert_eq!(
///     message,
///     "POST&https%3A%2F%2Fendpoint.com%2Fapi&paAm1%3DvaluE%26param2%3Dvalue2%26param2%3Dvalue3"
/// );
/// ```
pub fn build_message(params: &NormalizedParams, url: &str, method: &str) -> SigningResult<String> {
    let method: Method = method.parse()?;
    Ok(build_message_for(params, url, method))
}

/// Build the canonical message for an already validated [`Method`].
#[must_use]
pub fn build_message_for(params: &NormalizedParams, url: &str, method: Method) -> String {
    let encoded_url = quote(url);
    let encoded_params = quote(&build_param_block(params));

    format!("{method}&{encoded_url}&{encoded_params}")
}

/// Build the sorted `k=v&k=v` parameter block before its outer encoding.
///
/// Keys and values are percent-encoded first, one pair per value, and the
/// pairs are sorted by key and then by value.
///
/// # Examples
///
/// ```
/// use laterpay_signing::canonical::build_param_block;
/// use laterpay_signing::RawParams;
///
/// let params = RawParams::pairs([("b", "2"), ("a", "x y"), ("b", "1"), ("hmac", "dropped")]);
/// assert_eq!(build_param_block(&params.normalize()), "a=x%20y&b=1&b=2");
/// ```
#[must_use]
pub fn build_param_block(params: &NormalizedParams) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .filter(|(key, _)| !is_reserved(key))
        .flat_map(|(key, values)| {
            let key = quote(key);
            values.iter().map(move |value| (key.clone(), quote(value)))
        })
        .collect();

    pairs.sort_unstable();

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Whether `key` is stripped before signing.
#[must_use]
pub fn is_reserved(key: &str) -> bool {
    RESERVED_PARAMS.contains(&key)
}

/// Percent-encode `input` with no safe characters beyond the unreserved set.
///
/// # Examples
///
/// ```
/// use laterpay_signing::canonical::quote;
///
/// assert_eq!(quote("https://endpoint.com/ąpi"), "https%3A%2F%2Fendpoint.com%2F%C4%85pi");
/// assert_eq!(quote("a-b_c.d~e"), "a-b_c.d~e");
/// ```
#[must_use]
pub fn quote(input: &str) -> String {
    utf8_percent_encode(input, SAFE_EMPTY_ENCODE_SET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SigningError;
    use crate::params::{ParamValue, RawParams};

    #[test]
    fn test_should_encode_unicode_key_value_and_url() {
        let params = RawParams::map([("parĄm1", "valuĘ")]);
        let message = build_message(&params.normalize(), "https://endpoint.com/ąpi", "POST").unwrap();

        assert_eq!(
            message,
            "POST&https%3A%2F%2Fendpoint.com%2F%C4%85pi&par%25C4%2584m1%3Dvalu%25C4%2598"
        );
    }

    #[test]
    fn test_should_match_message_from_utf8_bytes() {
        let params = RawParams::map([(
            String::from_utf8(b"par\xc4\x84m1".to_vec()).unwrap(),
            ParamValue::from_utf8(b"valu\xc4\x98".to_vec()).unwrap(),
        )]);
        let message = build_message(&params.normalize(), "https://endpoint.com/ąpi", "POST").unwrap();

        assert_eq!(
            message,
            "POST&https%3A%2F%2Fendpoint.com%2F%C4%85pi&par%25C4%2584m1%3Dvalu%25C4%2598"
        );
    }

    #[test]
    fn test_should_sort_and_combine_params() {
        let params = RawParams::map([
            ("parĄm1", ParamValue::from("valuĘ")),
            ("param2", ParamValue::from(["value3", "value2"])),
            ("param3", ParamValue::from("with a space")),
        ]);
        let message = build_message(&params.normalize(), "https://endpoint.com/api", "POST").unwrap();

        assert_eq!(
            message,
            "POST&\
             https%3A%2F%2Fendpoint.com%2Fapi&\
             par%25C4%2584m1%3Dvalu%25C4%2598\
             %26param2%3Dvalue2\
             %26param2%3Dvalue3\
             %26param3%3Dwith%2520a%2520space"
        );
    }

    #[test]
    fn test_should_sort_on_encoded_pairs() {
        // `%` sorts before letters once keys are encoded.
        let params = RawParams::map([
            ("a b", ParamValue::from("c&d")),
            ("e", ParamValue::from(["2", "1"])),
            ("ñ", ParamValue::from("~x*")),
        ]);
        let message = build_message(&params.normalize(), "https://h.com/p a", "delete").unwrap();

        assert_eq!(
            message,
            "DELETE&https%3A%2F%2Fh.com%2Fp%20a&\
             %25C3%25B1%3D~x%252A%26a%2520b%3Dc%2526d%26e%3D1%26e%3D2"
        );
    }

    #[test]
    fn test_should_reject_unsupported_method() {
        let params = RawParams::map([("parĄm1", "valuĘ")]);
        for method in ["PATCH", "WRONG", ""] {
            let result = build_message(&params.normalize(), "https://endpoint.com/ąpi", method);
            assert!(matches!(result, Err(SigningError::UnsupportedMethod(_))));
        }
    }

    #[test]
    fn test_should_skip_reserved_params() {
        let plain = RawParams::map([("cp", "laternews")]);
        let with_reserved = RawParams::map([
            ("cp", "laternews"),
            ("hmac", "f6e5b115"),
            ("gettoken", "1"),
        ]);

        assert_eq!(
            build_message_for(&plain.normalize(), "http://example.com", Method::Get),
            build_message_for(&with_reserved.normalize(), "http://example.com", Method::Get)
        );
    }

    #[test]
    fn test_should_build_empty_param_block() {
        let message = build_message_for(&NormalizedParams::new(), "http://example.com", Method::Head);
        assert_eq!(message, "HEAD&http%3A%2F%2Fexample.com&");
    }

    #[test]
    fn test_should_be_independent_of_input_shape_and_order() {
        let url = "https://endpoint.com/api";
        let shapes = [
            RawParams::map([("a", ParamValue::from("1")), ("b", ParamValue::from(["2", "3"]))]),
            RawParams::pairs([("b", "3"), ("a", "1"), ("b", "2")]),
            RawParams::multi_map([("b", "2"), ("b", "3"), ("a", "1")]),
            RawParams::from_query("b=3&a=1&b=2"),
        ];

        let messages: Vec<String> = shapes
            .iter()
            .map(|p| build_message_for(&p.normalize(), url, Method::Post))
            .collect();
        assert!(messages.windows(2).all(|w| w[0] == w[1]));
    }
}
