//! `fetch` for script functions
//!
//! Requests are validated against a [`FetchConfig`] before anything touches
//! the network, run on a shared tokio runtime, and handed back to the
//! invocation's event loop as a job.

pub mod client;
pub mod headers;
pub mod policy;
pub mod response;

pub use client::FetchClient;
pub use headers::Headers;
pub use response::{Response, ResponseData};

use thiserror::Error;
use url::Url;

/// Why a fetch was rejected. The display text is what scripts see.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("insecure HTTP not allowed")]
    InsecureNotAllowed,

    #[error("private network not allowed: {0}")]
    PrivateNetwork(String),

    #[error("host not allowed: {0}")]
    HostNotAllowed(String),

    #[error("host blocked: {0}")]
    HostBlocked(String),

    #[error("redirects not allowed")]
    RedirectNotAllowed,

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("response too large (limit {0} bytes)")]
    ResponseTooLarge(u64),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,
}

/// What to do with a 3xx response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectMode {
    #[default]
    Follow,
    Error,
    Manual,
}

impl std::str::FromStr for RedirectMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "follow" => Ok(RedirectMode::Follow),
            "error" => Ok(RedirectMode::Error),
            "manual" => Ok(RedirectMode::Manual),
            _ => Err(format!("unknown redirect mode: {}", s)),
        }
    }
}

/// A request ready to send
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: String,
    pub headers: Headers,
    pub body: Option<String>,
    pub redirect: RedirectMode,
}

impl FetchRequest {
    /// A GET with no headers
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: Headers::new(),
            body: None,
            redirect: RedirectMode::Follow,
        }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_uppercase();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_redirect(mut self, mode: RedirectMode) -> Self {
        self.redirect = mode;
        self
    }

    /// Add the default `User-Agent` and `Content-Type` when absent
    pub fn apply_defaults(&mut self) {
        if !self.headers.has("user-agent") {
            self.headers.set("User-Agent", crate::remote::USER_AGENT);
        }
        if self.body.is_some() && !self.headers.has("content-type") {
            self.headers.set("Content-Type", "text/plain; charset=utf-8");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let url = Url::parse("https://example.com/a").unwrap();
        let mut request = FetchRequest::get(url.clone())
            .with_method("post")
            .with_body("hello");
        request.apply_defaults();
        assert_eq!(request.method, "POST");
        assert_eq!(request.headers.get("user-agent"), Some("frost/1.0"));
        assert_eq!(
            request.headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );

        let mut custom = FetchRequest::get(url)
            .with_header("content-type", "application/json")
            .with_header("User-Agent", "frost-test")
            .with_body("{}");
        custom.apply_defaults();
        assert_eq!(custom.headers.get("content-type"), Some("application/json"));
        assert_eq!(custom.headers.get("user-agent"), Some("frost-test"));
    }

    #[test]
    fn test_get_has_no_content_type() {
        let mut request = FetchRequest::get(Url::parse("https://example.com").unwrap());
        request.apply_defaults();
        assert!(!request.headers.has("content-type"));
    }

    #[test]
    fn test_redirect_mode_from_str() {
        assert_eq!("manual".parse::<RedirectMode>(), Ok(RedirectMode::Manual));
        assert_eq!("error".parse::<RedirectMode>(), Ok(RedirectMode::Error));
        assert!("sometimes".parse::<RedirectMode>().is_err());
    }

    #[test]
    fn test_error_text() {
        assert_eq!(
            FetchError::InsecureNotAllowed.to_string(),
            "insecure HTTP not allowed"
        );
        assert_eq!(
            FetchError::ResponseTooLarge(10).to_string(),
            "response too large (limit 10 bytes)"
        );
        assert_eq!(
            FetchError::Type("body must be a string".into()).to_string(),
            "TypeError: body must be a string"
        );
    }
}
