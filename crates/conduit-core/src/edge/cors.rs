//! CORS preflight handling and the fixed set of security response headers.

/// Methods advertised on every preflight response.
pub const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
/// Headers advertised on every preflight response.
pub const ALLOWED_HEADERS: &str =
    "Authorization, Content-Type, X-Correlation-ID, X-CSRF-Token, X-Requested-With";

/// Origin allow-list supporting exact match and a single `*` wildcard
/// anywhere in the pattern (prefix+suffix match).
#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    allowed_origins: Vec<String>,
    hsts: bool,
}

impl CorsConfig {
    /// Build a config from a list of origin patterns (`"https://example.com"`
    /// or `"https://*.example.com"`).
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self {
            allowed_origins,
            hsts: false,
        }
    }

    /// Enable `Strict-Transport-Security` on every response.
    pub fn with_hsts(mut self, hsts: bool) -> Self {
        self.hsts = hsts;
        self
    }

    /// The allow-listed origin matching `origin`, if any.
    pub fn matching_origin<'a>(&self, origin: &'a str) -> Option<&'a str> {
        self.allowed_origins
            .iter()
            .any(|pattern| origin_matches(pattern, origin))
            .then_some(origin)
    }

    /// `true` iff `method` + `Origin` header mark this as a CORS preflight.
    pub fn is_preflight(method: &str, origin: Option<&str>, request_method: Option<&str>) -> bool {
        method.eq_ignore_ascii_case("OPTIONS") && origin.is_some() && request_method.is_some()
    }

    /// The full set of headers to attach to a response for `origin` (CORS
    /// allow-origin, when matched, plus the fixed security headers).
    pub fn response_headers(&self, origin: Option<&str>) -> Vec<(&'static str, String)> {
        let mut headers = security_headers(self.hsts);
        if let Some(origin) = origin.and_then(|o| self.matching_origin(o)) {
            headers.push(("Access-Control-Allow-Origin", origin.to_string()));
            headers.push(("Access-Control-Allow-Methods", ALLOWED_METHODS.to_string()));
            headers.push(("Access-Control-Allow-Headers", ALLOWED_HEADERS.to_string()));
            headers.push(("Vary", "Origin".to_string()));
        }
        headers
    }
}

/// The fixed security headers attached to every response, regardless of CORS
/// outcome.
pub fn security_headers(hsts: bool) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        ("X-Content-Type-Options", "nosniff".to_string()),
        ("X-Frame-Options", "DENY".to_string()),
        ("X-XSS-Protection", "1; mode=block".to_string()),
        ("Referrer-Policy", "no-referrer".to_string()),
        ("Content-Security-Policy", "default-src 'self'".to_string()),
    ];
    if hsts {
        headers.push((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains".to_string(),
        ));
    }
    headers
}

fn origin_matches(pattern: &str, origin: &str) -> bool {
    match pattern.find('*') {
        None => pattern == origin,
        Some(idx) => {
            let prefix = &pattern[..idx];
            let suffix = &pattern[idx + 1..];
            origin.starts_with(prefix) && origin.ends_with(suffix) && origin.len() >= prefix.len() + suffix.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let cfg = CorsConfig::new(vec!["https://example.com".to_string()]);
        assert_eq!(cfg.matching_origin("https://example.com"), Some("https://example.com"));
        assert_eq!(cfg.matching_origin("https://evil.com"), None);
    }

    #[test]
    fn wildcard_subdomain_match() {
        let cfg = CorsConfig::new(vec!["https://*.example.com".to_string()]);
        assert_eq!(
            cfg.matching_origin("https://app.example.com"),
            Some("https://app.example.com")
        );
        assert_eq!(cfg.matching_origin("https://example.com"), None);
        assert_eq!(cfg.matching_origin("https://app.example.org"), None);
    }

    #[test]
    fn security_headers_always_present() {
        let headers = security_headers(false);
        assert!(headers.iter().any(|(k, _)| *k == "X-Frame-Options"));
        assert!(!headers.iter().any(|(k, _)| *k == "Strict-Transport-Security"));
    }

    #[test]
    fn hsts_header_added_when_enabled() {
        let headers = security_headers(true);
        assert!(headers.iter().any(|(k, _)| *k == "Strict-Transport-Security"));
    }

    #[test]
    fn preflight_detection() {
        assert!(CorsConfig::is_preflight("OPTIONS", Some("https://x"), Some("POST")));
        assert!(!CorsConfig::is_preflight("GET", Some("https://x"), Some("POST")));
        assert!(!CorsConfig::is_preflight("OPTIONS", None, Some("POST")));
    }
}
