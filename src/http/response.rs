//! Cached response values handed to the storage collaborator.
//!
//! A [`CachedResponse`] is a plain value: the redaction pass in
//! [`crate::cache::redact`] never edits one in place, it builds a new one.

use bytes::Bytes;

use super::{Headers, Method};

/// The request half of a cached response, as it will be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CachedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl CachedRequest {
    pub fn new(method: impl Into<Method>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// A response as stored by a cache backend, together with the request that produced it.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::{CachedRequest, CachedResponse};
///
/// let response = CachedResponse::new(200, "https://example.com/?token=abc")
///     .header("Content-Type", "text/plain")
///     .body("hello")
///     .request(CachedRequest::new("GET", "https://example.com/?token=abc"));
///
/// assert_eq!(response.status, 200);
/// assert_eq!(response.request.url, "https://example.com/?token=abc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
    pub request: CachedRequest,
}

impl CachedResponse {
    pub fn new(status: u16, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            status,
            request: CachedRequest::new(Method::Get, url.clone()),
            url,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn request(mut self, request: CachedRequest) -> Self {
        self.request = request;
        self
    }
}
