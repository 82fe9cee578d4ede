//! Responses delivered through the Available future.

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Basic,
    Cors,
    Opaque,
    /// A network error. Carries no status, headers or url list.
    Error,
}

/// Response metadata. Body bytes stay with the execution driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    response_type: ResponseType,
    status: u16,
    status_text: String,
    url_list: Vec<Url>,
    headers: Vec<(String, String)>,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, status_text: impl Into<String>, url_list: Vec<Url>) -> Self {
        Self {
            response_type: ResponseType::Basic,
            status,
            status_text: status_text.into(),
            url_list,
            headers: Vec::new(),
        }
    }

    /// The network-error response. Every failure path of the service
    /// resolves Available with this shape.
    #[must_use]
    pub fn network_error() -> Self {
        Self {
            response_type: ResponseType::Error,
            status: 0,
            status_text: String::new(),
            url_list: Vec::new(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    #[must_use]
    pub fn is_network_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    #[must_use]
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Final URL after redirects, if any.
    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.url_list.last()
    }

    #[must_use]
    pub fn url_list(&self) -> &[Url] {
        &self.url_list
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Why a fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The driver ran the fetch to completion (including network failures
    /// that were reported as a network-error response).
    Normal,
    /// The fetch was cancelled or could not be started.
    Aborted,
}

impl EndReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Aborted => "aborted",
        }
    }
}
