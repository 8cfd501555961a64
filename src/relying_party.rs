//! # Relying Party Resolution
//!
//! Every ceremony is bound to a relying-party id (a domain) and an expected
//! origin. Both come from fixed configuration when set (`RP_ID`,
//! `EXPECTED_ORIGIN`), otherwise from the request:
//! - rp id: `X-Forwarded-Host`, then `Host`, without the port
//! - origin: `<X-Forwarded-Proto or http>://<host>`

use crate::config::Config;
use crate::error::AppError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,
    pub origin: String,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        // Proxies may append a list; the first entry is the client-facing one.
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Strips the port from `host`, keeping bracketed IPv6 literals intact.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        if let Some(end) = host.find(']') {
            return &host[..=end];
        }
    }
    host.split(':').next().unwrap_or(host)
}

impl RelyingParty {
    pub fn resolve(headers: &HeaderMap, config: &Config) -> Result<Self, AppError> {
        let host = header(headers, "x-forwarded-host").or_else(|| header(headers, "host"));

        let id = match (&config.rp_id, host) {
            (Some(id), _) => id.clone(),
            (None, Some(host)) => strip_port(host).to_string(),
            (None, None) => return Err(AppError::BadRequest("missing host header".to_string())),
        };

        let origin = match (&config.expected_origin, host) {
            (Some(origin), _) => origin.clone(),
            (None, Some(host)) => {
                let proto = header(headers, "x-forwarded-proto").unwrap_or("http");
                format!("{}://{}", proto, host)
            }
            (None, None) => return Err(AppError::BadRequest("missing host header".to_string())),
        };

        Ok(Self { id, origin })
    }
}

impl FromRequestParts<AppState> for RelyingParty {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Self::resolve(&parts.headers, &state.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_derived_from_host() {
        let headers = headers(&[("host", "localhost:4000")]);
        let rp = RelyingParty::resolve(&headers, &Config::default()).unwrap();
        assert_eq!(rp.id, "localhost");
        assert_eq!(rp.origin, "http://localhost:4000");
    }

    #[test]
    fn test_forwarded_headers_win() {
        let rp = RelyingParty::resolve(
            &headers(&[
                ("host", "10.0.0.5:4000"),
                ("x-forwarded-host", "passkeys.example.org"),
                ("x-forwarded-proto", "https"),
            ]),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(rp.id, "passkeys.example.org");
        assert_eq!(rp.origin, "https://passkeys.example.org");
    }

    #[test]
    fn test_configured_values_override() {
        let config = Config {
            rp_id: Some("example.org".to_string()),
            expected_origin: Some("https://login.example.org".to_string()),
            ..Config::default()
        };
        let rp = RelyingParty::resolve(&headers(&[("host", "evil.test")]), &config).unwrap();
        assert_eq!(rp.id, "example.org");
        assert_eq!(rp.origin, "https://login.example.org");

        // Overrides also cover a request with no host at all.
        assert!(RelyingParty::resolve(&HeaderMap::new(), &config).is_ok());
    }

    #[test]
    fn test_missing_host_is_bad_request() {
        let err = RelyingParty::resolve(&HeaderMap::new(), &Config::default()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_ipv6_host() {
        assert_eq!(strip_port("[::1]:4000"), "[::1]");
        assert_eq!(strip_port("example.org"), "example.org");
    }
}
