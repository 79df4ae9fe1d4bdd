//! Route filter (§4.1 step 3, C8): longest-prefix match + upstream proxy.
//!
//! The teacher has no reverse-proxy analog (`api::create_router` composes
//! in-process handlers, not upstream forwarding); this module is written
//! fresh but reuses `reqwest` (already a teacher dependency, used there for
//! webhook delivery and OIDC code exchange) for the outbound call.

mod error;

pub use error::RouteError;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};

/// A matched route: the logical upstream name (used as `upstream_service`
/// in the telemetry record) and the prefix-stripped forward URL.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route_id: String,
    pub upstream_service: String,
    pub forward_url: String,
}

/// Match `path` against `routes` (already sorted longest-prefix-first by
/// `Config::from_env`), stripping the matched prefix and appending the
/// remainder to the upstream base URL.
#[must_use]
pub fn match_route(routes: &[(String, String)], path: &str) -> Option<RouteMatch> {
    for (prefix, upstream_base) in routes {
        if let Some(remainder) = path.strip_prefix(prefix.as_str()) {
            // Require a boundary: either the whole path matched, or the next
            // character is `/`, so `/api` doesn't spuriously match `/apikeys`.
            if !remainder.is_empty() && !remainder.starts_with('/') {
                continue;
            }
            let upstream_service = upstream_base
                .trim_start_matches("http://")
                .trim_start_matches("https://")
                .split('/')
                .next()
                .unwrap_or(upstream_base)
                .to_owned();
            return Some(RouteMatch {
                route_id: prefix.clone(),
                upstream_service,
                forward_url: format!("{}{}", upstream_base.trim_end_matches('/'), remainder),
            });
        }
    }
    None
}

/// Forward the request to the matched upstream and relay its response.
pub async fn proxy(
    client: &reqwest::Client,
    route: &RouteMatch,
    method: Method,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, HeaderMap, Bytes), RouteError> {
    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);

    let mut builder = client.request(reqwest_method, &route.forward_url);
    for (name, value) in headers {
        if name == axum::http::header::HOST {
            continue;
        }
        builder = builder.header(name, value);
    }
    let response = builder.body(body).send().await?;

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut out_headers = HeaderMap::new();
    for (name, value) in response.headers() {
        if let (Ok(n), Ok(v)) = (
            axum::http::HeaderName::from_bytes(name.as_str().as_bytes()),
            axum::http::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out_headers.insert(n, v);
        }
    }
    let body = response.bytes().await?;
    Ok((status, out_headers, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes() -> Vec<(String, String)> {
        let mut r = vec![
            ("/api".to_owned(), "http://users-svc".to_owned()),
            ("/api/users".to_owned(), "http://users-svc".to_owned()),
        ];
        r.sort_by_key(|(p, _)| std::cmp::Reverse(p.len()));
        r
    }

    #[test]
    fn longest_prefix_wins() {
        let m = match_route(&routes(), "/api/users/42").unwrap();
        assert_eq!(m.route_id, "/api/users");
        assert_eq!(m.forward_url, "http://users-svc/42");
    }

    #[test]
    fn no_match_returns_none() {
        assert!(match_route(&routes(), "/unmatched").is_none());
    }

    #[test]
    fn prefix_boundary_respected() {
        let routes = vec![("/api".to_owned(), "http://svc".to_owned())];
        assert!(match_route(&routes, "/apikeys").is_none());
        assert!(match_route(&routes, "/api/keys").is_some());
        assert!(match_route(&routes, "/api").is_some());
    }
}
