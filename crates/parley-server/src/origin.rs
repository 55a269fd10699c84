//! Origin allow-list for socket upgrades.

use axum::http::HeaderMap;
use axum::http::header::ORIGIN;

/// Origins permitted to open a socket.
///
/// Matching is exact apart from ASCII case and a trailing `/`. A request
/// without an `Origin` header is refused.
#[derive(Clone, Debug)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    /// Build a policy from configured origins.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|o| normalize(o.as_ref()))
                .filter(|o| !o.is_empty())
                .collect(),
        }
    }

    /// Whether `origin` is on the list.
    pub fn allows(&self, origin: &str) -> bool {
        let origin = normalize(origin);
        self.allowed.iter().any(|allowed| *allowed == origin)
    }

    /// Whether the request's `Origin` header is on the list.
    pub fn allows_request(&self, headers: &HeaderMap) -> bool {
        headers
            .get(ORIGIN)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|origin| self.allows(origin))
    }
}

fn normalize(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn policy() -> OriginPolicy {
        OriginPolicy::new(["https://localhost:4000"])
    }

    #[test]
    fn exact_match_allowed() {
        assert!(policy().allows("https://localhost:4000"));
    }

    #[test]
    fn case_and_trailing_slash_ignored() {
        assert!(policy().allows("HTTPS://LocalHost:4000/"));
    }

    #[test]
    fn other_origins_refused() {
        let p = policy();
        assert!(!p.allows("https://evil.example.com"));
        assert!(!p.allows("http://localhost:4000"));
        assert!(!p.allows("https://localhost:4001"));
        assert!(!p.allows(""));
    }

    #[test]
    fn missing_header_refused() {
        assert!(!policy().allows_request(&HeaderMap::new()));
    }

    #[test]
    fn header_checked() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ORIGIN, HeaderValue::from_static("https://localhost:4000"));
        assert!(policy().allows_request(&headers));
    }

    #[test]
    fn empty_list_refuses_everything() {
        let p = OriginPolicy::new(Vec::<String>::new());
        assert!(!p.allows("https://localhost:4000"));
    }
}
