//! URL and address policy
//!
//! Checks run in a fixed order: scheme, insecure HTTP, private literal
//! hosts, blocked hosts, allowed hosts. Nothing here performs I/O.

use super::FetchError;
use crate::config::FetchConfig;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Parse and validate a URL string
pub fn validate_url(raw: &str, config: &FetchConfig) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", raw, e)))?;
    validate(&url, config)?;
    Ok(url)
}

/// Validate an already parsed URL, also used for every redirect target
pub fn validate(url: &Url, config: &FetchConfig) -> Result<(), FetchError> {
    match url.scheme() {
        "https" => {}
        "http" if config.allow_insecure => {}
        "http" => return Err(FetchError::InsecureNotAllowed),
        other => {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                other
            )))
        }
    }

    let host = url
        .host()
        .ok_or_else(|| FetchError::InvalidUrl(format!("{}: missing host", url)))?;
    let name = host_name(&host);

    if !config.allow_private_networks && is_private_host(&host) {
        return Err(FetchError::PrivateNetwork(name));
    }
    if config.blocked_hosts.iter().any(|p| host_matches(p, &name)) {
        return Err(FetchError::HostBlocked(name));
    }
    if !config.allowed_hosts.is_empty()
        && !config.allowed_hosts.iter().any(|p| host_matches(p, &name))
    {
        return Err(FetchError::HostNotAllowed(name));
    }
    Ok(())
}

fn host_name(host: &Host<&str>) -> String {
    match host {
        Host::Domain(domain) => domain.to_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    }
}

fn is_private_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.to_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Host::Ipv4(ip) => is_private_ip(IpAddr::V4(*ip)),
        Host::Ipv6(ip) => is_private_ip(IpAddr::V6(*ip)),
    }
}

/// Exact match or `*.suffix` wildcard, case-insensitive
pub fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let host = host.to_lowercase();
    match pattern.strip_prefix("*.") {
        Some(suffix) => host.len() > suffix.len() && host.ends_with(&format!(".{}", suffix)),
        None => pattern == host,
    }
}

/// Loopback, RFC 1918, link-local, unspecified and IPv6 unique-local addresses
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_v4(mapped);
            }
            is_private_v6(v6)
        }
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fe80::/10
        || (first & 0xffc0) == 0xfe80
        // fc00::/7
        || (first & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FetchConfig {
        FetchConfig::default()
    }

    #[test]
    fn test_scheme_checks() {
        assert!(validate_url("https://example.com/x", &config()).is_ok());
        assert_eq!(
            validate_url("http://example.com/x", &config()).unwrap_err(),
            FetchError::InsecureNotAllowed
        );
        assert!(matches!(
            validate_url("ftp://example.com/x", &config()),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("::not a url", &config()),
            Err(FetchError::InvalidUrl(_))
        ));

        let insecure = FetchConfig {
            allow_insecure: true,
            ..config()
        };
        assert!(validate_url("http://example.com/x", &insecure).is_ok());
    }

    #[test]
    fn test_private_hosts() {
        for url in [
            "https://localhost/x",
            "https://127.0.0.1/x",
            "https://10.1.2.3/",
            "https://172.16.0.1/",
            "https://192.168.1.1/",
            "https://169.254.169.254/latest",
            "https://[::1]/",
            "https://[fe80::1]/",
            "https://[fd00::1]/",
        ] {
            assert!(
                matches!(
                    validate_url(url, &config()),
                    Err(FetchError::PrivateNetwork(_))
                ),
                "{} should be private",
                url
            );
        }

        let open = FetchConfig {
            allow_private_networks: true,
            ..config()
        };
        assert!(validate_url("https://127.0.0.1/x", &open).is_ok());
        assert!(validate_url("https://172.32.0.1/", &config()).is_ok());
    }

    #[test]
    fn test_allow_and_block_lists() {
        let lists = FetchConfig {
            allowed_hosts: vec!["*.example.com".into(), "api.test".into()],
            blocked_hosts: vec!["bad.example.com".into()],
            ..config()
        };
        assert!(validate_url("https://a.example.com/", &lists).is_ok());
        assert!(validate_url("https://API.test/", &lists).is_ok());
        assert_eq!(
            validate_url("https://bad.example.com/", &lists).unwrap_err(),
            FetchError::HostBlocked("bad.example.com".into())
        );
        assert_eq!(
            validate_url("https://example.com/", &lists).unwrap_err(),
            FetchError::HostNotAllowed("example.com".into())
        );
        assert_eq!(
            validate_url("https://other.org/", &lists).unwrap_err(),
            FetchError::HostNotAllowed("other.org".into())
        );
    }

    #[test]
    fn test_wildcard_needs_a_label() {
        assert!(host_matches("*.example.com", "a.b.example.com"));
        assert!(!host_matches("*.example.com", "example.com"));
        assert!(!host_matches("*.example.com", "badexample.com"));
    }

    #[test]
    fn test_mapped_ipv4() {
        let mapped: IpAddr = "::ffff:10.0.0.1".parse().unwrap();
        assert!(is_private_ip(mapped));
        let public: IpAddr = "93.184.216.34".parse().unwrap();
        assert!(!is_private_ip(public));
    }
}
