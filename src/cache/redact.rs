//! Scrubbing ignored parameters from a response before it is stored.

use tracing::trace;

use super::normalize::{filter_url, normalize_body};
use super::settings::{IgnoredParameters, REDACTED};
use crate::http::{CachedRequest, CachedResponse, Headers};

/// Returns a copy of `response` with every ignored parameter masked.
///
/// Applies to the response URL and headers and to the originating request's
/// URL, headers and body. Query strings are sorted, headers are sorted by
/// case-insensitive name and a urlencoded or JSON request body gets the same
/// treatment as during key derivation. The response body is stored as is.
///
/// With no ignored parameters the response is returned unchanged.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::{redact_response, IgnoredParameters};
/// use rttp_cache::http::{CachedRequest, CachedResponse};
///
/// let ignored: IgnoredParameters = ["api_key", "Authorization"].into_iter().collect();
/// let response = CachedResponse::new(200, "https://example.com/?q=1&api_key=s3cr3t")
///     .request(
///         CachedRequest::new("GET", "https://example.com/?q=1&api_key=s3cr3t")
///             .header("Authorization", "Bearer s3cr3t"),
///     );
///
/// let redacted = redact_response(&response, &ignored);
/// assert_eq!(redacted.url, "https://example.com/?api_key=REDACTED&q=1");
/// assert_eq!(redacted.request.headers.get("authorization"), Some("REDACTED"));
/// ```
pub fn redact_response(response: &CachedResponse, ignored: &IgnoredParameters) -> CachedResponse {
    if ignored.is_empty() {
        return response.clone();
    }
    trace!(url = %response.url, "redacting cached response");

    let request = &response.request;
    let mut discarded = Vec::new();
    let request_body = normalize_body(&request.body, &request.headers, ignored, None, &mut discarded);

    CachedResponse {
        status: response.status,
        url: filter_url(&response.url, ignored),
        headers: filter_sort_headers(&response.headers, ignored),
        body: response.body.clone(),
        request: CachedRequest {
            method: request.method.clone(),
            url: filter_url(&request.url, ignored),
            headers: filter_sort_headers(&request.headers, ignored),
            body: request_body,
        },
    }
}

// Values are kept per field line, unlike key normalization which folds them.
fn filter_sort_headers(headers: &Headers, ignored: &IgnoredParameters) -> Headers {
    let mut fields: Vec<(&str, &str)> = headers.iter().collect();
    fields.sort_by_cached_key(|(name, _)| name.to_ascii_lowercase());

    fields
        .into_iter()
        .map(|(name, value)| {
            if ignored.contains_header(name) {
                (name, REDACTED)
            } else {
                (name, value)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignored(names: &[&str]) -> IgnoredParameters {
        names.iter().copied().collect()
    }

    #[test]
    fn nothing_ignored_is_identity() {
        let response = CachedResponse::new(200, "https://example.com/?b=2&a=1")
            .header("X-B", "1")
            .header("X-A", "2");
        assert_eq!(redact_response(&response, &IgnoredParameters::new()), response);
    }

    #[test]
    fn masks_urls_headers_and_body() {
        let response = CachedResponse::new(200, "https://example.com/path?token=t&z=1#frag")
            .header("Set-Cookie", "a=1")
            .header("X-Token", "t")
            .header("Set-Cookie", "b=2")
            .body("response body with token=t")
            .request(
                CachedRequest::new("POST", "https://example.com/path?token=t")
                    .header("Content-Type", "application/json")
                    .header("Token", "t")
                    .body(r#"{"token": "t", "user": "u"}"#),
            );

        let redacted = redact_response(&response, &ignored(&["token", "x-token"]));

        assert_eq!(redacted.status, 200);
        assert_eq!(redacted.url, "https://example.com/path?token=REDACTED&z=1#frag");
        assert_eq!(
            redacted.headers.iter().collect::<Vec<_>>(),
            [("Set-Cookie", "a=1"), ("Set-Cookie", "b=2"), ("X-Token", "REDACTED")]
        );
        assert_eq!(redacted.body, response.body);

        assert_eq!(redacted.request.method, response.request.method);
        assert_eq!(redacted.request.url, "https://example.com/path?token=REDACTED");
        assert_eq!(redacted.request.headers.get("token"), Some("REDACTED"));
        assert_eq!(
            redacted.request.body.as_ref(),
            br#"{"token":"REDACTED","user":"u"}"#
        );
    }

    #[test]
    fn original_response_is_untouched() {
        let response = CachedResponse::new(200, "https://example.com/?key=v");
        let _ = redact_response(&response, &ignored(&["key"]));
        assert_eq!(response.url, "https://example.com/?key=v");
    }

    #[test]
    fn stored_json_body_keeps_large_integers() {
        let response = CachedResponse::new(200, "https://example.com/items").request(
            CachedRequest::new("POST", "https://example.com/items")
                .header("Content-Type", "application/json")
                .body(r#"{"token": "t", "id": 18446744073709551617}"#),
        );
        let redacted = redact_response(&response, &ignored(&["token"]));
        assert_eq!(
            redacted.request.body.as_ref(),
            br#"{"id":18446744073709551617,"token":"REDACTED"}"#
        );
    }

    #[test]
    fn form_body_is_masked() {
        let response = CachedResponse::new(201, "https://example.com/login").request(
            CachedRequest::new("POST", "https://example.com/login")
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body("user=u&password=p"),
        );
        let redacted = redact_response(&response, &ignored(&["password"]));
        assert_eq!(redacted.request.body.as_ref(), b"password=REDACTED&user=u");
    }
}
