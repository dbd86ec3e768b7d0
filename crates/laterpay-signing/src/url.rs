//! Splitting URLs into the components the signer cares about.
//!
//! Only `scheme://netloc/path` takes part in a signature. The query string,
//! the fragment and, for the schemes in [`USES_PARAMS`], any `;params` on the
//! last path segment are dropped before the message is built, so that a URL
//! carrying its own query still signs the same as the bare endpoint.

/// Schemes whose last path segment may carry `;params`.
///
/// For any other scheme a `;` is an ordinary path character.
pub const USES_PARAMS: [&str; 15] = [
    "", "ftp", "hdl", "prospero", "http", "imap", "https", "shttp", "rtsp", "rtspu", "sip",
    "sips", "mms", "sftp", "tel",
];

/// The components of a URL, following generic URL split rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitUrl<'a> {
    /// Lowercased scheme, empty if absent.
    pub scheme: String,
    /// Network location (`user:pass@host:port`), empty if absent.
    pub netloc: &'a str,
    /// Path without `;params`.
    pub path: &'a str,
    /// Parameters of the last path segment (after `;`).
    pub params: &'a str,
    /// Query string without the leading `?`.
    pub query: &'a str,
    /// Fragment without the leading `#`.
    pub fragment: &'a str,
}

impl SplitUrl<'_> {
    /// The URL reduced to `scheme://netloc/path`, as used in the signed message.
    ///
    /// # Examples
    ///
    /// ```
    /// use laterpay_signing::url::split_url;
    ///
    /// let url = split_url("HTTPS://user@endpoint.com:8443/api;v=1?x=1#top");
    /// assert_eq!(url.base_url(), "https://user@endpoint.com:8443/api");
    /// ```
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.netloc, self.path)
    }

    /// `scheme://netloc/path` with `;params` re-attached when present.
    #[must_use]
    pub fn resource(&self) -> String {
        if self.params.is_empty() {
            self.base_url()
        } else {
            format!("{};{}", self.base_url(), self.params)
        }
    }
}

/// Split `url` into scheme, netloc, path, params, query and fragment.
///
/// # Examples
///
/// ```
/// use laterpay_signing::url::split_url;
///
/// let url = split_url("https://endpoint.com/api?a=1#frag");
/// assert_eq!(url.scheme, "https");
/// assert_eq!(url.netloc, "endpoint.com");
/// assert_eq!(url.path, "/api");
/// assert_eq!(url.query, "a=1");
/// assert_eq!(url.fragment, "frag");
/// ```
#[must_use]
pub fn split_url(url: &str) -> SplitUrl<'_> {
    let (scheme, mut rest) = split_scheme(url);

    let mut netloc = "";
    if let Some(after_slashes) = rest.strip_prefix("//") {
        let end = after_slashes
            .find(['/', '?', '#'])
            .unwrap_or(after_slashes.len());
        netloc = &after_slashes[..end];
        rest = &after_slashes[end..];
    }

    let (rest, fragment) = rest.split_once('#').unwrap_or((rest, ""));
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    let (path, params) = if USES_PARAMS.contains(&scheme.as_str()) {
        split_params(path)
    } else {
        (path, "")
    };

    SplitUrl {
        scheme,
        netloc,
        path,
        params,
        query,
        fragment,
    }
}

/// Split off a leading `scheme:` if the prefix is a syntactically valid scheme.
fn split_scheme(url: &str) -> (String, &str) {
    let Some(colon) = url.find(':') else {
        return (String::new(), url);
    };
    let candidate = &url[..colon];
    let valid = candidate
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    if valid {
        (candidate.to_ascii_lowercase(), &url[colon + 1..])
    } else {
        (String::new(), url)
    }
}

/// Split `;params` off the last segment of `path`.
fn split_params(path: &str) -> (&str, &str) {
    let segment_start = path.rfind('/').unwrap_or(0);
    match path[segment_start..].find(';') {
        Some(offset) => {
            let at = segment_start + offset;
            (&path[..at], &path[at + 1..])
        }
        None => (path, ""),
    }
}
