//! Fetch requests as handed to the service.

use thiserror::Error;
use url::Url;

use crate::principal::is_loopback_url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid request url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid request method '{0}'")]
    InvalidMethod(String),
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
}

/// An immutable fetch request.
///
/// Built once by the caller, then moved into the service. The execution
/// driver receives a clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: Url,
    method: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    keepalive: bool,
}

impl Request {
    /// A `GET` request for `url`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
            keepalive: false,
        }
    }

    pub fn parse(url: &str) -> Result<Self, RequestError> {
        let parsed = Url::parse(url).map_err(|e| RequestError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(parsed))
    }

    /// Set the method. Methods are HTTP tokens; the common ones are
    /// normalized to upper case.
    pub fn with_method(mut self, method: &str) -> Result<Self, RequestError> {
        if method.is_empty() || !method.bytes().all(is_token_byte) {
            return Err(RequestError::InvalidMethod(method.to_string()));
        }
        let upper = method.to_ascii_uppercase();
        self.method = match upper.as_str() {
            "DELETE" | "GET" | "HEAD" | "OPTIONS" | "POST" | "PUT" => upper,
            _ => method.to_string(),
        };
        Ok(self)
    }

    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, RequestError> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return Err(RequestError::InvalidHeader(name));
        }
        if value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0) {
            return Err(RequestError::InvalidHeader(name));
        }
        self.headers.push((name, value));
        Ok(self)
    }

    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Mark the request as keepalive: it may outlive its originating
    /// context and is subject to keepalive admission control.
    #[must_use]
    pub fn with_keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Values of every header named `name` (case-insensitive), in insertion order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    #[must_use]
    pub fn keepalive(&self) -> bool {
        self.keepalive
    }

    /// Whether the request targets the local machine.
    #[must_use]
    pub fn targets_loopback(&self) -> bool {
        is_loopback_url(&self.url)
    }
}

// RFC 9110 tchar.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
