//! Derives cache keys and expirations for a few requests and prints them.
//!
//! ```text
//! RUST_LOG=rttp_cache=debug cargo run --example fingerprint
//! ```

use rttp_cache::cache::{
    CacheDirectives, ExpirationPolicy, ExpireAfter, KeyDeriver, KeySettings, MatchHeaders,
    UrlExpirationTable, build_cache_control_headers,
};
use rttp_cache::http::{Headers, Request};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings: KeySettings = serde_json::from_str(
        r#"{
            "ignored_parameters": ["api_key", "Authorization"],
            "match_headers": ["Accept"],
            "serializer": "json-v1"
        }"#,
    )?;
    let deriver = KeyDeriver::new(settings);
    println!("digest: {:?}", deriver.algorithm());

    let requests = [
        Request::new("GET", "https://api.example.com/users?page=2&api_key=abc")
            .header("Accept", "application/json, text/plain"),
        Request::new("get", "https://API.example.com:443/users?api_key=xyz&page=2")
            .header("accept", "text/plain,application/json"),
        Request::new("POST", "https://api.example.com/users")
            .json(serde_json::json!({"name": "ada", "api_key": "abc"})),
    ];
    for request in &requests {
        let normalized = deriver.normalize(request)?;
        let key = deriver.derive(&normalized, normalized.verify());
        println!("{key}  {} {}", normalized.method(), normalized.url());
    }

    let policy = ExpirationPolicy::new().expire_after(300).urls_expire_after(
        UrlExpirationTable::new()
            .glob("*.example.com/static", ExpireAfter::Never)?
            .glob("api.example.com/users", 60)?,
    );
    for url in [
        "https://cdn.example.com/static/app.js",
        "https://api.example.com/users/1",
        "https://example.org/",
    ] {
        println!("{url} -> {:?}", policy.decide(Some(url), None)?);
    }

    let mut upstream = Headers::new();
    upstream.insert("Cache-Control", "public, max-age=120");
    upstream.insert("ETag", "\"v1\"");
    let directives = CacheDirectives::from_headers(&upstream);
    println!(
        "response: expire_after={:?} validator={}",
        directives.expire_after(),
        directives.has_validator()
    );

    let outgoing = build_cache_control_headers(&Headers::new(), Some(&60.into()), false, true, false)?;
    println!("request headers: {outgoing}");
    Ok(())
}
