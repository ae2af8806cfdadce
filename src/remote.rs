//! Blocking HTTP access for remote rule sets and remote `$ref` targets

use crate::config::HttpClientConfig;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;

pub const USER_AGENT: &str = "frost/1.0";

/// Largest remote document accepted
const MAX_DOCUMENT_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("insecure URL '{0}' requires the insecure flag")]
    Insecure(String),

    #[error("unable to read TLS material '{path}': {source}")]
    TlsFile {
        path: String,
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("'{url}' returned status {status}")]
    Status { url: String, status: u16 },

    #[error("unable to read response body: {0}")]
    Body(#[from] std::io::Error),
}

/// Shared blocking client configured once per execution
#[derive(Debug, Clone)]
pub struct RemoteLoader {
    client: reqwest::blocking::Client,
    allow_insecure: bool,
}

impl RemoteLoader {
    pub fn new(config: &HttpClientConfig) -> Result<Self, RemoteError> {
        let mut builder = reqwest::blocking::Client::builder()
            .use_rustls_tls()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)));

        if let Some(ca) = &config.ca_file {
            let pem = read_tls_file(ca)?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }
        if let (Some(cert), Some(key)) = (&config.cert_file, &config.key_file) {
            let mut pem = read_tls_file(cert)?;
            pem.push(b'\n');
            pem.extend(read_tls_file(key)?);
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }
        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
            allow_insecure: config.insecure,
        })
    }

    /// Permit plain `http://` URLs
    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// GET a document, enforcing HTTPS unless insecure access is allowed
    pub fn fetch(&self, location: &str) -> Result<Vec<u8>, RemoteError> {
        let url =
            url::Url::parse(location).map_err(|_| RemoteError::InvalidUrl(location.to_string()))?;
        match url.scheme() {
            "https" => {}
            "http" if self.allow_insecure => {}
            "http" => return Err(RemoteError::Insecure(location.to_string())),
            _ => return Err(RemoteError::InvalidUrl(location.to_string())),
        }

        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                url: location.to_string(),
                status: status.as_u16(),
            });
        }
        let mut body = Vec::new();
        response.take(MAX_DOCUMENT_SIZE).read_to_end(&mut body)?;
        Ok(body)
    }
}

fn read_tls_file(path: &std::path::Path) -> Result<Vec<u8>, RemoteError> {
    std::fs::read(path).map_err(|source| RemoteError::TlsFile {
        path: path.display().to_string(),
        source,
    })
}
