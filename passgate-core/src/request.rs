//! The slice of the incoming HTTP request the ceremonies need.

use url::Url;

/// Host and header lookup for the request carrying a ceremony response.
pub trait ServerRequest {
    /// Host name without port.
    fn host(&self) -> Option<&str>;

    /// Case-insensitive header lookup.
    fn header(&self, name: &str) -> Option<&str>;
}

/// Owned request description for hosts that do not have a request type of
/// their own at hand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    host: Option<String>,
    headers: Vec<(String, String)>,
}

impl RequestInfo {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl ServerRequest for RequestInfo {
    fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A request URL carries a host but no headers.
impl ServerRequest for Url {
    fn host(&self) -> Option<&str> {
        self.host_str()
    }

    fn header(&self, _name: &str) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_info_headers() {
        let request = RequestInfo::new("example.com").with_header("Sec-Token-Binding", "abc");
        assert_eq!(request.host(), Some("example.com"));
        assert_eq!(request.header("sec-token-binding"), Some("abc"));
        assert_eq!(request.header("cookie"), None);
    }

    #[test]
    fn test_url_request() {
        let url = Url::parse("https://login.example.com:8443/webauthn").unwrap();
        assert_eq!(ServerRequest::host(&url), Some("login.example.com"));
        assert_eq!(url.header("anything"), None);
    }
}
