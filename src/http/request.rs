//! Request inspection.
//!
//! # Responsibilities
//! - Extract the requested version token (query parameter or header)
//! - Split `/{service}/{rest..}` into the service name and the path to
//!   forward
//!
//! # Design Decisions
//! - A non-blank query parameter wins over the header
//! - Blank tokens are treated as "no version preference"
//! - The service prefix is stripped before forwarding

use axum::http::{HeaderMap, Uri};

/// Name of the version query parameter and request header.
pub const VERSION_HEADER: &str = "X-service-version";

/// Service name and forwarded path of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRoute {
    pub service: String,
    /// Path (always starting with `/`) plus query, if any.
    pub path_and_query: String,
}

/// Extract the version token from the query string or headers.
pub fn version_token(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    let from_query = uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == VERSION_HEADER)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.trim().is_empty())
    });
    if from_query.is_some() {
        return from_query;
    }

    headers
        .get(VERSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Split the first path segment off as the service name.
pub fn split_service_path(uri: &Uri) -> Option<ServiceRoute> {
    let path = uri.path().trim_start_matches('/');
    let (service, rest) = match path.find('/') {
        Some(idx) => (&path[..idx], &path[idx..]),
        None => (path, "/"),
    };
    if service.is_empty() {
        return None;
    }

    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", rest, query),
        None => rest.to_string(),
    };
    Some(ServiceRoute {
        service: service.to_string(),
        path_and_query,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn headers(version: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(v) = version {
            headers.insert(VERSION_HEADER, HeaderValue::from_str(v).unwrap());
        }
        headers
    }

    #[test]
    fn test_query_takes_precedence() {
        let token = version_token(&uri("/orders/list?X-service-version=v2"), &headers(Some("v1")));
        assert_eq!(token.as_deref(), Some("v2"));
    }

    #[test]
    fn test_blank_query_falls_back_to_header() {
        let token = version_token(&uri("/orders?X-service-version=%20"), &headers(Some("v1")));
        assert_eq!(token.as_deref(), Some("v1"));

        let token = version_token(&uri("/orders?other=1"), &headers(Some("v1")));
        assert_eq!(token.as_deref(), Some("v1"));
    }

    #[test]
    fn test_header_is_case_insensitive() {
        let mut map = HeaderMap::new();
        map.insert("x-service-version", HeaderValue::from_static("v3"));
        assert_eq!(version_token(&uri("/orders"), &map).as_deref(), Some("v3"));
    }

    #[test]
    fn test_no_token() {
        assert_eq!(version_token(&uri("/orders"), &headers(None)), None);
        assert_eq!(version_token(&uri("/orders"), &headers(Some("  "))), None);
    }

    #[test]
    fn test_split_service_path() {
        assert_eq!(
            split_service_path(&uri("/orders/api/items?page=2")),
            Some(ServiceRoute {
                service: "orders".to_string(),
                path_and_query: "/api/items?page=2".to_string(),
            })
        );
        assert_eq!(
            split_service_path(&uri("/orders")).unwrap().path_and_query,
            "/"
        );
        assert_eq!(
            split_service_path(&uri("/orders?x=1")).unwrap().path_and_query,
            "/?x=1"
        );
        assert_eq!(split_service_path(&uri("/")), None);
    }
}
