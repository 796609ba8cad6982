//! Outgoing requests, in unprepared and prepared form.
//!
//! A [`Request`] is what a caller builds: a URL plus separate query params,
//! form fields, a JSON value, raw data and file uploads. [`Request::prepare`]
//! materializes it into a [`PreparedRequest`] with a final URL, a complete
//! header map and a single body, which is what cache keys are derived from.

use bytes::{BufMut, Bytes, BytesMut};
use url::form_urlencoded;

use super::{Body, Headers, Method};

/// Multipart boundary used when preparing requests with file uploads.
///
/// HTTP clients normally pick a random boundary per request. A fixed one keeps
/// the encoded body, and so the cache key, identical across repeated
/// preparations of the same logical request.
pub const FORM_BOUNDARY: &str = "rttp-cache-form-boundary";

/// One file in a `multipart/form-data` upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub content: Bytes,
}

impl FilePart {
    pub fn new(
        field: impl Into<String>,
        filename: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            field: field.into(),
            filename: filename.into(),
            content_type: None,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// An unprepared request.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::{Method, Request};
///
/// let prepared = Request::new(Method::Post, "https://example.com/search")
///     .param("page", "2")
///     .form("q", "rust")
///     .prepare();
///
/// assert_eq!(prepared.url(), "https://example.com/search?page=2");
/// assert_eq!(
///     prepared.headers().get("content-type"),
///     Some("application/x-www-form-urlencoded")
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: Headers,
    params: Vec<(String, String)>,
    form: Vec<(String, String)>,
    data: Option<Body>,
    json: Option<serde_json::Value>,
    files: Vec<FilePart>,
    verify: bool,
}

impl Request {
    /// Creates a request with no headers or body. TLS verification defaults to on.
    pub fn new(method: impl Into<Method>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Headers::new(),
            params: Vec::new(),
            form: Vec::new(),
            data: None,
            json: None,
            files: Vec::new(),
            verify: true,
        }
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a query parameter to be added to the URL on preparation.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Appends a form field. Form fields take precedence over `data` and `json`.
    #[must_use]
    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    /// Sets a raw body.
    #[must_use]
    pub fn data(mut self, body: impl Into<Body>) -> Self {
        self.data = Some(body.into());
        self
    }

    /// Sets a JSON body, used when no form fields or files are present.
    #[must_use]
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.json = Some(value);
        self
    }

    /// Adds a file upload, switching the prepared body to `multipart/form-data`.
    #[must_use]
    pub fn file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    /// Sets the TLS verification flag, which is part of the cache key.
    #[must_use]
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Returns `true` if the request carries file uploads.
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    /// Materializes this request into its final URL, headers and body.
    ///
    /// Body precedence: files (multipart, with [`FORM_BOUNDARY`]), then form
    /// fields (urlencoded), then `json`, then raw `data`. A `Content-Type`
    /// header is only added when the caller did not set one.
    pub fn prepare(&self) -> PreparedRequest {
        let mut headers = self.headers.clone();
        let url = append_params(&self.url, &self.params);

        let (body, content_type) = if !self.files.is_empty() {
            (
                Some(Body::Bytes(encode_multipart(&self.form, &self.files))),
                Some(format!("multipart/form-data; boundary={FORM_BOUNDARY}")),
            )
        } else if !self.form.is_empty() {
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.form)
                .finish();
            (
                Some(Body::Text(encoded)),
                Some("application/x-www-form-urlencoded".to_owned()),
            )
        } else if let Some(json) = &self.json {
            (
                Some(Body::Text(json.to_string())),
                Some("application/json".to_owned()),
            )
        } else {
            (self.data.clone(), None)
        };

        if let Some(content_type) = content_type {
            if !headers.contains("content-type") {
                headers.insert("Content-Type", content_type);
            }
        }

        PreparedRequest {
            method: self.method.clone(),
            url,
            headers,
            body,
            verify: self.verify,
        }
    }
}

/// A request ready to be sent: final URL, complete headers, single body.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    method: Method,
    url: String,
    headers: Headers,
    body: Option<Body>,
    verify: bool,
}

impl PreparedRequest {
    pub fn new(method: impl Into<Method>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Headers::new(),
            body: None,
            verify: true,
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn is_verify(&self) -> bool {
        self.verify
    }
}

/// Either form of request accepted by the normalizer.
///
/// Unprepared requests are materialized with [`Request::prepare`] first;
/// prepared ones are normalized as they are.
#[derive(Debug, Clone, Copy)]
pub enum RequestInput<'a> {
    Unprepared(&'a Request),
    Prepared(&'a PreparedRequest),
}

impl<'a> From<&'a Request> for RequestInput<'a> {
    fn from(request: &'a Request) -> Self {
        Self::Unprepared(request)
    }
}

impl<'a> From<&'a PreparedRequest> for RequestInput<'a> {
    fn from(request: &'a PreparedRequest) -> Self {
        Self::Prepared(request)
    }
}

fn append_params(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_owned();
    }
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();

    let mut out = String::with_capacity(url.len() + encoded.len() + 1);
    out.push_str(base);
    if !base.contains('?') {
        out.push('?');
    } else if !base.ends_with('?') && !base.ends_with('&') {
        out.push('&');
    }
    out.push_str(&encoded);
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

fn encode_multipart(form: &[(String, String)], files: &[FilePart]) -> Bytes {
    let mut buf = BytesMut::new();
    for (name, value) in form {
        buf.put(format!("--{FORM_BOUNDARY}\r\n").as_bytes());
        buf.put(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
        buf.put(value.as_bytes());
        buf.put(&b"\r\n"[..]);
    }
    for file in files {
        buf.put(format!("--{FORM_BOUNDARY}\r\n").as_bytes());
        buf.put(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                file.field, file.filename
            )
            .as_bytes(),
        );
        if let Some(content_type) = &file.content_type {
            buf.put(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        buf.put(&b"\r\n"[..]);
        buf.put(file.content.as_ref());
        buf.put(&b"\r\n"[..]);
    }
    buf.put(format!("--{FORM_BOUNDARY}--\r\n").as_bytes());
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_appended_before_fragment() {
        let req = Request::new("GET", "https://example.com/a?x=1#top").param("y", "two words");
        assert_eq!(
            req.prepare().url(),
            "https://example.com/a?x=1&y=two+words#top"
        );
    }

    #[test]
    fn json_body_sets_content_type() {
        let req = Request::new("POST", "https://example.com")
            .json(serde_json::json!({"b": 1, "a": 2}));
        let prepared = req.prepare();
        assert_eq!(prepared.headers().get("content-type"), Some("application/json"));
        assert!(matches!(prepared.body_ref(), Some(Body::Text(_))));
    }

    #[test]
    fn explicit_content_type_is_kept() {
        let req = Request::new("POST", "https://example.com")
            .header("Content-Type", "application/vnd.api+json")
            .json(serde_json::json!({}));
        assert_eq!(
            req.prepare().headers().get("content-type"),
            Some("application/vnd.api+json")
        );
    }

    #[test]
    fn multipart_preparation_is_deterministic() {
        let req = Request::new("POST", "https://example.com/upload")
            .form("kind", "avatar")
            .file(FilePart::new("file", "me.png", &b"\x89PNG"[..]).content_type("image/png"));
        assert!(req.has_files());

        let first = req.prepare();
        let second = req.prepare();
        let (Some(Body::Bytes(a)), Some(Body::Bytes(b))) = (first.body_ref(), second.body_ref())
        else {
            panic!("expected multipart bytes");
        };
        assert_eq!(a, b);
        assert!(
            first
                .headers()
                .get("content-type")
                .is_some_and(|ct| ct.ends_with(FORM_BOUNDARY))
        );
        let text = String::from_utf8_lossy(a);
        assert!(text.contains("name=\"kind\"\r\n\r\navatar\r\n"));
        assert!(text.ends_with(&format!("--{FORM_BOUNDARY}--\r\n")));
    }

    #[test]
    fn verify_flag_survives_preparation() {
        let req = Request::new("GET", "https://example.com").verify(false);
        assert!(!req.prepare().is_verify());
    }
}
