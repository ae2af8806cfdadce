//! Network side of `fetch`
//!
//! One [`FetchClient`] is built per execution and shared by every script
//! invocation. Requests run on a process-wide tokio runtime; completion is
//! reported through a callback so the caller decides which thread sees it.

use super::{policy, FetchError, FetchRequest, Headers, RedirectMode, ResponseData};
use crate::cancel::CancelToken;
use crate::config::FetchConfig;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

const MAX_REDIRECTS: usize = 10;

fn runtime() -> Result<&'static tokio::runtime::Runtime, FetchError> {
    static RUNTIME: OnceLock<Result<tokio::runtime::Runtime, String>> = OnceLock::new();
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("frost-fetch")
                .enable_all()
                .build()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| FetchError::Network(format!("unable to start runtime: {}", e)))
}

/// Resolver that refuses private addresses at dial time
struct GuardedResolver {
    allow_private: bool,
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let allow_private = self.allow_private;
        Box::pin(async move {
            let host = name.as_str().to_string();
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
                .await?
                .collect();
            if !allow_private && addrs.iter().any(|a| policy::is_private_ip(a.ip())) {
                let err: Box<dyn std::error::Error + Send + Sync> =
                    Box::new(FetchError::PrivateNetwork(host));
                return Err(err);
            }
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}

/// Shared HTTP client enforcing a [`FetchConfig`]
#[derive(Clone)]
pub struct FetchClient {
    /// Follows redirects, revalidating every hop
    follow: reqwest::Client,
    /// Never follows redirects
    direct: reqwest::Client,
    config: Arc<FetchConfig>,
}

impl FetchClient {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let config = Arc::new(config.clone());

        let hop_config = config.clone();
        let follow_policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > MAX_REDIRECTS {
                return attempt.error(FetchError::TooManyRedirects);
            }
            match policy::validate(attempt.url(), &hop_config) {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        });

        let follow = Self::builder(&config)
            .redirect(follow_policy)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let direct = Self::builder(&config)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            follow,
            direct,
            config,
        })
    }

    fn builder(config: &FetchConfig) -> reqwest::ClientBuilder {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .dns_resolver(Arc::new(GuardedResolver {
                allow_private: config.allow_private_networks,
            }));
        if !config.timeout.is_zero() {
            builder = builder.timeout(config.timeout);
        }
        builder
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Send a request in the background and report the outcome to `done`.
    ///
    /// Policy failures are reported before returning, without spawning.
    pub fn start<F>(&self, mut request: FetchRequest, cancel: CancelToken, done: F)
    where
        F: FnOnce(Result<ResponseData, FetchError>) + Send + 'static,
    {
        if let Err(e) = policy::validate(&request.url, &self.config) {
            done(Err(e));
            return;
        }
        if cancel.is_cancelled() {
            done(Err(FetchError::Cancelled));
            return;
        }
        let runtime = match runtime() {
            Ok(runtime) => runtime,
            Err(e) => {
                done(Err(e));
                return;
            }
        };

        request.apply_defaults();
        let client = self.clone();
        let timeout = self.config.timeout;
        runtime.spawn(async move {
            let work = async {
                if timeout.is_zero() {
                    client.perform(request).await
                } else {
                    tokio::time::timeout(timeout, client.perform(request))
                        .await
                        .unwrap_or(Err(FetchError::Timeout))
                }
            };
            let outcome = tokio::select! {
                outcome = work => outcome,
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
            };
            done(outcome);
        });
    }

    async fn perform(&self, request: FetchRequest) -> Result<ResponseData, FetchError> {
        let FetchRequest {
            url,
            method,
            headers,
            body,
            redirect,
        } = request;

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| FetchError::Type(format!("invalid method '{}'", method)))?;
        let client = match redirect {
            RedirectMode::Follow => &self.follow,
            RedirectMode::Error | RedirectMode::Manual => &self.direct,
        };

        let mut builder = client.request(method, url.clone());
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let mut response = builder.send().await.map_err(classify)?;
        let status = response.status();
        if redirect == RedirectMode::Error && status.is_redirection() {
            return Err(FetchError::RedirectNotAllowed);
        }

        let limit = self.config.max_response_size;
        if let Some(length) = response.content_length() {
            if limit > 0 && length > limit {
                return Err(FetchError::ResponseTooLarge(limit));
            }
        }

        let final_url = response.url().to_string();
        let redirected = redirect == RedirectMode::Follow && final_url != url.as_str();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect();

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            bytes.extend_from_slice(&chunk);
            if limit > 0 && bytes.len() as u64 > limit {
                return Err(FetchError::ResponseTooLarge(limit));
            }
        }

        Ok(ResponseData {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            url: final_url,
            redirected,
            body: bytes,
        })
    }
}

impl std::fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Recover policy errors raised inside the redirect policy or resolver
fn classify(err: reqwest::Error) -> FetchError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
    while let Some(current) = source {
        if let Some(fetch) = current.downcast_ref::<FetchError>() {
            return fetch.clone();
        }
        source = current.source();
    }
    if err.is_timeout() {
        return FetchError::Timeout;
    }
    FetchError::Network(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::time::Duration;
    use url::Url;

    /// Serve canned responses, one per connection, on 127.0.0.1
    fn serve(responses: Vec<String>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut buf = [0u8; 4096];
                let mut seen = Vec::new();
                while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => seen.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = stream.write_all(response.as_bytes());
            }
        });
        port
    }

    fn ok(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Probe: yes\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    fn local_config() -> FetchConfig {
        FetchConfig {
            allow_insecure: true,
            allow_private_networks: true,
            timeout: Duration::from_secs(5),
            ..FetchConfig::default()
        }
    }

    fn send(client: &FetchClient, request: FetchRequest) -> Result<ResponseData, FetchError> {
        let (tx, rx) = mpsc::channel();
        client.start(request, CancelToken::new(), move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.recv_timeout(Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_policy_rejection_is_synchronous() {
        let client = FetchClient::new(&FetchConfig::default()).unwrap();
        let request = FetchRequest::get(Url::parse("http://example.com/x").unwrap());
        let (tx, rx) = mpsc::channel();
        client.start(request, CancelToken::new(), move |outcome| {
            let _ = tx.send(outcome);
        });
        // no runtime hop: the result is already there
        assert_eq!(
            rx.try_recv().unwrap().unwrap_err(),
            FetchError::InsecureNotAllowed
        );
    }

    #[test]
    fn test_cancelled_token_short_circuits() {
        let client = FetchClient::new(&local_config()).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let (tx, rx) = mpsc::channel();
        let request = FetchRequest::get(Url::parse("http://127.0.0.1:9/").unwrap());
        client.start(request, token, move |outcome| {
            let _ = tx.send(outcome);
        });
        assert_eq!(rx.try_recv().unwrap().unwrap_err(), FetchError::Cancelled);
    }

    #[test]
    fn test_get_reads_body_and_headers() {
        let port = serve(vec![ok("hello")]);
        let client = FetchClient::new(&local_config()).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{}/x", port)).unwrap();
        let response = send(&client, FetchRequest::get(url)).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.body, b"hello");
        assert_eq!(response.headers.get("x-trace"), Some("yes"));
        assert!(!response.redirected);
    }

    #[test]
    fn test_body_limit() {
        let port = serve(vec![ok("hello world")]);
        let config = FetchConfig {
            max_response_size: 4,
            ..local_config()
        };
        let client = FetchClient::new(&config).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        assert_eq!(
            send(&client, FetchRequest::get(url)).unwrap_err(),
            FetchError::ResponseTooLarge(4)
        );
    }

    #[test]
    fn test_redirect_modes() {
        let redirect =
            "HTTP/1.1 302 Found\r\nLocation: /next\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string();

        let port = serve(vec![redirect.clone()]);
        let client = FetchClient::new(&local_config()).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        assert_eq!(
            send(
                &client,
                FetchRequest::get(url.clone()).with_redirect(RedirectMode::Error)
            )
            .unwrap_err(),
            FetchError::RedirectNotAllowed
        );

        let port = serve(vec![redirect.clone()]);
        let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        let manual = send(
            &client,
            FetchRequest::get(url).with_redirect(RedirectMode::Manual),
        )
        .unwrap();
        assert_eq!(manual.status, 302);
        assert!(!manual.redirected);

        let port = serve(vec![redirect, ok("done")]);
        let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        let followed = send(&client, FetchRequest::get(url)).unwrap();
        assert_eq!(followed.body, b"done");
        assert!(followed.redirected);
        assert!(followed.url.ends_with("/next"));
    }

    #[test]
    fn test_redirect_target_is_revalidated() {
        let redirect = "HTTP/1.1 302 Found\r\nLocation: http://blocked.test/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
        let port = serve(vec![redirect]);
        let config = FetchConfig {
            blocked_hosts: vec!["blocked.test".into()],
            ..local_config()
        };
        let client = FetchClient::new(&config).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        assert_eq!(
            send(&client, FetchRequest::get(url)).unwrap_err(),
            FetchError::HostBlocked("blocked.test".into())
        );
    }
}
