use crate::policy::LimitClass;
use actix_web::dev::ServiceRequest;
use actix_web::http::header::{HeaderMap, HeaderName};
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::net::SocketAddr;

pub static API_KEY: Lazy<HeaderName> = Lazy::new(|| HeaderName::from_static("api_key"));

pub static X_REAL_IP: Lazy<HeaderName> = Lazy::new(|| HeaderName::from_static("x-real-ip"));

pub static X_FORWARDED_FOR: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-forwarded-for"));

/// Identifier used when a request carries no usable address at all.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Who a request is counted against.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Identity {
    pub class: LimitClass,
    pub identifier: String,
}

impl Identity {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            class: LimitClass::BY_TOKEN,
            identifier: token.into(),
        }
    }

    pub fn ip(ip: impl Into<String>) -> Self {
        Self {
            class: LimitClass::BY_IP,
            identifier: ip.into(),
        }
    }
}

/// Picks the [Identity] of a request.
///
/// A non-empty token header always wins. Otherwise the caller is identified by IP, taken from the
/// first of these that is present:
///
/// 1. The real IP header.
/// 2. The first entry of the forwarded-for header.
/// 3. The connection peer address (without port).
///
/// # Security
///
/// The real IP and forwarded-for headers are trusted as is, which is only suitable for
/// applications deployed behind a proxy that you control.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    token_header: HeaderName,
    real_ip_header: HeaderName,
    forwarded_for_header: HeaderName,
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self {
            token_header: API_KEY.clone(),
            real_ip_header: X_REAL_IP.clone(),
            forwarded_for_header: X_FORWARDED_FOR.clone(),
        }
    }
}

impl RequestClassifier {
    pub fn token_header(mut self, name: HeaderName) -> Self {
        self.token_header = name;
        self
    }

    pub fn real_ip_header(mut self, name: HeaderName) -> Self {
        self.real_ip_header = name;
        self
    }

    pub fn forwarded_for_header(mut self, name: HeaderName) -> Self {
        self.forwarded_for_header = name;
        self
    }

    pub fn classify(&self, req: &ServiceRequest) -> Identity {
        self.classify_parts(req.headers(), req.peer_addr())
    }

    pub fn classify_parts(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Identity {
        if let Some(token) = header_text(headers, &self.token_header) {
            return Identity::token(token);
        }
        if let Some(ip) = header_text(headers, &self.real_ip_header) {
            return Identity::ip(ip);
        }
        // A blank first entry falls through to the peer address
        if let Some(ip) = header_text(headers, &self.forwarded_for_header).and_then(|list| {
            list.split(',')
                .next()
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(ToOwned::to_owned)
        }) {
            return Identity::ip(ip);
        }
        match peer {
            Some(addr) => Identity::ip(addr.ip().to_string()),
            None => {
                log::debug!("Request has no peer address, counting it as `{UNKNOWN_IDENTIFIER}`");
                Identity::ip(UNKNOWN_IDENTIFIER)
            }
        }
    }
}

// Present and not blank; bytes outside visible ASCII are kept, decoded lossily
fn header_text<'h>(headers: &'h HeaderMap, name: &HeaderName) -> Option<Cow<'h, str>> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()))
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::HeaderValue;
    use actix_web::test::TestRequest;

    fn peer() -> SocketAddr {
        "192.0.2.1:1234".parse().unwrap()
    }

    fn classify(req: TestRequest) -> Identity {
        RequestClassifier::default().classify(&req.to_srv_request())
    }

    #[test]
    fn test_token_wins() {
        let req = TestRequest::default()
            .insert_header(("API_KEY", "abc123"))
            .insert_header(("X-Real-IP", "10.0.0.1"))
            .insert_header(("X-Forwarded-For", "10.0.0.2"))
            .peer_addr(peer());
        assert_eq!(classify(req), Identity::token("abc123"));
    }

    #[test]
    fn test_empty_token_ignored() {
        let req = TestRequest::default()
            .insert_header(("API_KEY", ""))
            .insert_header(("X-Real-IP", "10.0.0.1"));
        assert_eq!(classify(req), Identity::ip("10.0.0.1"));
    }

    #[test]
    fn test_real_ip_before_forwarded_for() {
        let req = TestRequest::default()
            .insert_header(("X-Real-IP", "10.0.0.1"))
            .insert_header(("X-Forwarded-For", "10.0.0.2"))
            .peer_addr(peer());
        assert_eq!(classify(req), Identity::ip("10.0.0.1"));
    }

    #[test]
    fn test_forwarded_for_first_entry_trimmed() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "  203.0.113.7 , 10.0.0.2, 10.0.0.3"))
            .peer_addr(peer());
        assert_eq!(classify(req), Identity::ip("203.0.113.7"));
    }

    #[test]
    fn test_blank_forwarded_for_entry_uses_peer() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", ", 10.0.0.2"))
            .peer_addr(peer());
        assert_eq!(classify(req), Identity::ip("192.0.2.1"));
    }

    #[test]
    fn test_non_ascii_token_still_wins() {
        let req = TestRequest::default()
            .insert_header((
                API_KEY.clone(),
                HeaderValue::from_bytes(b"t\xc3\xa9st").unwrap(),
            ))
            .insert_header(("X-Real-IP", "10.0.0.1"));
        assert_eq!(classify(req), Identity::token("t\u{e9}st"));
    }

    #[test]
    fn test_non_ascii_real_ip_not_skipped() {
        let req = TestRequest::default()
            .insert_header((
                X_REAL_IP.clone(),
                HeaderValue::from_bytes(b"10.0.0.\xff").unwrap(),
            ))
            .insert_header(("X-Forwarded-For", "10.0.0.2"));
        assert_eq!(classify(req), Identity::ip("10.0.0.\u{fffd}"));
    }

    #[test]
    fn test_peer_without_port() {
        let req = TestRequest::default().peer_addr(peer());
        assert_eq!(classify(req), Identity::ip("192.0.2.1"));

        let req = TestRequest::default().peer_addr("[2001:db8::1]:8080".parse().unwrap());
        assert_eq!(classify(req), Identity::ip("2001:db8::1"));
    }

    #[test]
    fn test_no_address() {
        assert_eq!(classify(TestRequest::default()), Identity::ip(UNKNOWN_IDENTIFIER));
    }

    #[test]
    fn test_custom_headers() {
        let classifier = RequestClassifier::default()
            .token_header(HeaderName::from_static("x-api-token"))
            .real_ip_header(HeaderName::from_static("cf-connecting-ip"));
        let req = TestRequest::default()
            .insert_header(("API_KEY", "ignored"))
            .insert_header(("CF-Connecting-IP", "198.51.100.4"))
            .to_srv_request();
        assert_eq!(classifier.classify(&req), Identity::ip("198.51.100.4"));

        let req = TestRequest::default()
            .insert_header(("X-Api-Token", "abc"))
            .to_srv_request();
        assert_eq!(classifier.classify(&req), Identity::token("abc"));
    }
}
