//! Request normalization.
//!
//! Normalizing a request collapses presentation-only differences (query and
//! header order, header name casing, JSON key order, whitespace in
//! multi-value headers, URL case and default ports) into one canonical form
//! and masks ignored parameters with [`REDACTED`]. The result feeds both the
//! key deriver and the redaction pass.
//!
//! Normalization is best effort for bodies: a malformed JSON body or a body
//! stream that cannot be rewound is not an error. The body is kept as-is and
//! a [`Diagnostic`] is attached to the [`NormalizedRequest`].

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::{Url, form_urlencoded};

use super::settings::{IgnoredParameters, MatchHeaders, REDACTED};
use crate::http::{Body, Headers, Method, PreparedRequest, RequestInput};

/// Bodies larger than this (10 MiB) are fingerprinted without normalization.
pub const MAX_NORM_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Scheme assumed for URLs given without one.
const DEFAULT_SCHEME: &str = "https";

/// Errors that abort normalization.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to read request body: {0}")]
    BodyRead(#[from] std::io::Error),
}

/// A soft failure recorded while normalizing. Normalization continued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The body declared a JSON content type but did not parse; it was kept verbatim.
    InvalidJsonBody { error: String },
    /// The body stream was read but could not be reset to its start.
    StreamNotRewound { reason: String },
}

/// A request in canonical form.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    method: Method,
    url: String,
    headers: Headers,
    body: Bytes,
    matched_headers: Vec<String>,
    verify: bool,
    diagnostics: Vec<Diagnostic>,
}

impl NormalizedRequest {
    /// Uppercased request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Canonical URL with a sorted, redacted query.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// All headers, redacted and sorted by case-insensitive name.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Body after content-type specific normalization.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// `lowercased-name=value` tokens for the headers selected by [`MatchHeaders`], sorted.
    pub fn matched_headers(&self) -> &[String] {
        &self.matched_headers
    }

    /// TLS verification flag carried over from the request.
    pub fn verify(&self) -> bool {
        self.verify
    }

    /// Soft failures encountered while normalizing.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Normalizes a request and removes ignored parameters from its URL, headers and body.
///
/// Unprepared requests are prepared first (see [`crate::http::Request::prepare`]).
/// The caller's request is not modified, except that a stream body is read and,
/// when the stream supports it, rewound.
///
/// # Errors
///
/// - [`NormalizeError::InvalidUrl`]: the URL cannot be parsed.
/// - [`NormalizeError::BodyRead`]: reading a stream body failed.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::{normalize_request, IgnoredParameters, MatchHeaders};
/// use rttp_cache::http::Request;
///
/// let ignored: IgnoredParameters = ["api_key"].into_iter().collect();
/// let request = Request::new("get", "HTTPS://Example.com:443/items?b=2&api_key=s3cr3t&a=1")
///     .header("Accept", "text/html, application/json");
///
/// let normalized =
///     normalize_request(&request, &ignored, &MatchHeaders::All, None).unwrap();
///
/// assert_eq!(normalized.method().as_str(), "GET");
/// assert_eq!(
///     normalized.url(),
///     "https://example.com/items?a=1&api_key=REDACTED&b=2"
/// );
/// assert_eq!(
///     normalized.matched_headers(),
///     ["accept=application/json, text/html"]
/// );
/// ```
pub fn normalize_request<'a>(
    request: impl Into<RequestInput<'a>>,
    ignored: &IgnoredParameters,
    match_headers: &MatchHeaders,
    content_root_key: Option<&str>,
) -> Result<NormalizedRequest, NormalizeError> {
    match request.into() {
        RequestInput::Unprepared(request) => normalize_prepared(
            &request.prepare(),
            ignored,
            match_headers,
            content_root_key,
        ),
        RequestInput::Prepared(request) => {
            normalize_prepared(request, ignored, match_headers, content_root_key)
        }
    }
}

fn normalize_prepared(
    request: &PreparedRequest,
    ignored: &IgnoredParameters,
    match_headers: &MatchHeaders,
    content_root_key: Option<&str>,
) -> Result<NormalizedRequest, NormalizeError> {
    let mut diagnostics = Vec::new();

    let url = normalize_url(request.url(), ignored)?;
    let headers = normalize_headers(request.headers(), ignored);
    let matched_headers = matched_header_tokens(&headers, match_headers);

    let raw_body = read_body(request.body_ref(), &mut diagnostics)?;
    let body = normalize_body(
        &raw_body,
        request.headers(),
        ignored,
        content_root_key,
        &mut diagnostics,
    );

    Ok(NormalizedRequest {
        method: Method::from(request.method().as_str()),
        url,
        headers,
        body,
        matched_headers,
        verify: request.is_verify(),
        diagnostics,
    })
}

/// Filters the query string, then canonicalizes the URL.
///
/// Canonicalization lowercases scheme and host, IDNA-encodes the host, strips
/// default ports and resolves dot segments. URLs without a scheme are read as
/// `https`.
///
/// # Errors
///
/// Returns [`NormalizeError::InvalidUrl`] when the URL does not parse.
pub fn normalize_url(url: &str, ignored: &IgnoredParameters) -> Result<String, NormalizeError> {
    let filtered = filter_url(url, ignored);
    let parsed = match Url::parse(&filtered) {
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("{DEFAULT_SCHEME}://{filtered}"))
        }
        other => other,
    };
    parsed
        .map(String::from)
        .map_err(|source| NormalizeError::InvalidUrl {
            url: url.to_owned(),
            source,
        })
}

/// Sorts and redacts the query string of `url`, leaving everything else untouched.
///
/// An empty resulting query drops the `?`.
pub fn filter_url(url: &str, ignored: &IgnoredParameters) -> String {
    let (rest, fragment) = match url.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (url, None),
    };
    let (base, query) = match rest.split_once('?') {
        Some((base, query)) => (base, normalize_params(query, ignored)),
        None => (rest, String::new()),
    };

    let mut out = String::with_capacity(url.len());
    out.push_str(base);
    if !query.is_empty() {
        out.push('?');
        out.push_str(&query);
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Normalizes urlencoded parameters from a query string or a form body.
///
/// Pairs are redacted, stably sorted by key and re-encoded. Keys without
/// `=` are appended afterwards, sorted and verbatim.
///
/// ```
/// use rttp_cache::cache::{normalize_params, IgnoredParameters};
///
/// let ignored: IgnoredParameters = ["token"].into_iter().collect();
/// assert_eq!(
///     normalize_params("z=1&flag&token=abc&a=hello%20world", &ignored),
///     "a=hello+world&token=REDACTED&z=1&flag"
/// );
/// ```
pub fn normalize_params(value: &str, ignored: &IgnoredParameters) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut bare: Vec<&str> = Vec::new();

    for segment in value.split('&').filter(|s| !s.is_empty()) {
        if segment.contains('=') {
            pairs.extend(
                form_urlencoded::parse(segment.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        } else {
            bare.push(segment);
        }
    }

    for (key, value) in &mut pairs {
        if ignored.contains(key) {
            *value = REDACTED.to_owned();
        }
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    bare.sort_unstable();

    let mut query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&pairs)
        .finish();
    if !bare.is_empty() {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&bare.join("&"));
    }
    query
}

/// Sorts headers by case-insensitive name, redacts ignored ones and
/// normalizes multi-value fields.
///
/// Repeated field lines are combined with `", "` first. Any value containing
/// a comma is then split, trimmed, lowercased, sorted and rejoined, so
/// `Accept: b, A` and `Accept: a,b` compare equal.
pub fn normalize_headers(headers: &Headers, ignored: &IgnoredParameters) -> Headers {
    let mut names = headers.names();
    names.sort_by_cached_key(|name| name.to_ascii_lowercase());

    let mut normalized = Headers::with_capacity(names.len());
    for name in names {
        let value = if ignored.contains_header(name) {
            REDACTED.to_owned()
        } else {
            let joined = headers.get_joined(name).unwrap_or_default();
            normalize_header_value(&joined)
        };
        normalized.insert(name, value);
    }
    normalized
}

fn normalize_header_value(value: &str) -> String {
    if !value.contains(',') {
        return value.to_owned();
    }
    let lowered = value.to_lowercase();
    let mut tokens: Vec<&str> = lowered
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    tokens.sort_unstable();
    tokens.join(", ")
}

/// Renders the headers selected by `match_headers` as sorted `name=value` tokens.
///
/// `headers` must already be normalized, so that each name appears once.
pub fn matched_header_tokens(headers: &Headers, match_headers: &MatchHeaders) -> Vec<String> {
    let mut names: Vec<&str> = match match_headers {
        MatchHeaders::None => return Vec::new(),
        MatchHeaders::All => headers.names(),
        MatchHeaders::Only(wanted) => headers
            .names()
            .into_iter()
            .filter(|name| wanted.iter().any(|w| w.eq_ignore_ascii_case(name)))
            .collect(),
    };
    names.sort_by_cached_key(|name| name.to_ascii_lowercase());

    names
        .into_iter()
        .filter_map(|name| {
            headers
                .get(name)
                .map(|value| format!("{}={value}", name.to_ascii_lowercase()))
        })
        .collect()
}

fn read_body(body: Option<&Body>, diagnostics: &mut Vec<Diagnostic>) -> Result<Bytes, NormalizeError> {
    match body {
        None => Ok(Bytes::new()),
        Some(body) if body.is_empty() => Ok(Bytes::new()),
        Some(Body::Bytes(bytes)) => Ok(bytes.clone()),
        Some(Body::Text(text)) => Ok(Bytes::copy_from_slice(text.as_bytes())),
        Some(Body::Stream(stream)) => {
            let (buf, rewind) = stream.read_and_rewind()?;
            if let Err(e) = rewind {
                warn!(error = %e, "unable to reset request body stream after reading it");
                diagnostics.push(Diagnostic::StreamNotRewound {
                    reason: e.to_string(),
                });
            }
            Ok(Bytes::from(buf))
        }
    }
}

/// Returns the lowercased media type of the `Content-Type` header, without parameters.
pub(crate) fn media_type(headers: &Headers) -> String {
    headers
        .get("content-type")
        .and_then(|ct| ct.split(';').next())
        .map(|mt| mt.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn is_json_media_type(media_type: &str) -> bool {
    media_type == "application/json"
        || (media_type.starts_with("application/") && media_type.ends_with("+json"))
}

/// Normalizes and filters a body according to the request's `Content-Type`.
pub(crate) fn normalize_body(
    body: &Bytes,
    headers: &Headers,
    ignored: &IgnoredParameters,
    content_root_key: Option<&str>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Bytes {
    if body.len() <= 2 || body.len() > MAX_NORM_BODY_SIZE {
        return body.clone();
    }

    let media_type = media_type(headers);
    if is_json_media_type(&media_type) {
        normalize_json_body(body, ignored, content_root_key, diagnostics)
    } else if media_type == "application/x-www-form-urlencoded" {
        match std::str::from_utf8(body) {
            Ok(text) => Bytes::from(normalize_params(text, ignored)),
            Err(_) => body.clone(),
        }
    } else {
        body.clone()
    }
}

fn normalize_json_body(
    body: &Bytes,
    ignored: &IgnoredParameters,
    content_root_key: Option<&str>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Bytes {
    let mut value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "invalid JSON body; fingerprinting it verbatim");
            diagnostics.push(Diagnostic::InvalidJsonBody {
                error: e.to_string(),
            });
            return body.clone();
        }
    };

    match content_root_key.filter(|key| value.get(*key).is_some()) {
        Some(key) => {
            if let Some(subtree) = value.get_mut(key) {
                filter_sort_json(subtree, ignored);
            }
        }
        None => filter_sort_json(&mut value, ignored),
    }

    match serde_json::to_vec(&value) {
        Ok(encoded) => Bytes::from(encoded),
        Err(_) => body.clone(),
    }
}

/// Redacts and sorts the top level of a JSON value.
///
/// Objects get ignored keys' values replaced and keys sorted. Arrays lose
/// string elements naming an ignored parameter and are sorted when every
/// element is a string, every element a number, or every element a bool;
/// other arrays keep their order. Nested values are left as they are.
fn filter_sort_json(value: &mut Value, ignored: &IgnoredParameters) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            *map = entries
                .into_iter()
                .map(|(key, value)| {
                    if ignored.contains(&key) {
                        (key, Value::String(REDACTED.to_owned()))
                    } else {
                        (key, value)
                    }
                })
                .collect();
        }
        Value::Array(items) => {
            items.retain(|item| !item.as_str().is_some_and(|s| ignored.contains(s)));
            sort_scalars(items);
        }
        _ => {}
    }
}

fn sort_scalars(items: &mut [Value]) {
    if items.iter().all(Value::is_string) {
        items.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    } else if items.iter().all(Value::is_number) {
        // Integers past 2^53 can collapse to one f64; their exact text breaks the tie.
        items.sort_by(|a, b| {
            let x = a.as_f64().unwrap_or(f64::NAN);
            let y = b.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y).then_with(|| a.to_string().cmp(&b.to_string()))
        });
    } else if items.iter().all(Value::is_boolean) {
        items.sort_by_key(|item| item.as_bool());
    }
}
