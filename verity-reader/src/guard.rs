use std::net::IpAddr;

use tracing::warn;
use verity_common::error::AppError;

/// Validates that `url` is safe to fetch during ingestion: http(s) scheme,
/// a present host, and not a localhost/private/link-local/loopback target
/// (SSRF protection).
pub fn ensure_ingestion_url_allowed(url: &url::Url) -> Result<(), AppError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            warn!(%url, %scheme, "rejected ingestion URL due to unsupported scheme");
            return Err(AppError::Validation(
                "unsupported URL scheme for ingestion".to_string(),
            ));
        }
    }

    let Some(host) = url.host_str() else {
        warn!(%url, "rejected ingestion URL missing host");
        return Err(AppError::Validation(
            "URL is missing a host component".to_string(),
        ));
    };

    if host.eq_ignore_ascii_case("localhost") {
        warn!(%url, host, "rejected ingestion URL to localhost");
        return Err(AppError::Validation(
            "ingestion URL host is not allowed".to_string(),
        ));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        let is_disallowed = match ip {
            IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
            IpAddr::V6(v6) => v6.is_unique_local() || v6.is_unicast_link_local(),
        };

        if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || is_disallowed {
            warn!(%url, host, %ip, "rejected ingestion URL pointing to restricted network range");
            return Err(AppError::Validation(
                "ingestion URL host is not allowed".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_scheme() {
        let url = url::Url::parse("ftp://example.com").unwrap();
        assert!(ensure_ingestion_url_allowed(&url).is_err());
    }

    #[test]
    fn rejects_localhost() {
        let url = url::Url::parse("http://localhost/resource").unwrap();
        assert!(ensure_ingestion_url_allowed(&url).is_err());
    }

    #[test]
    fn rejects_private_ipv4() {
        let url = url::Url::parse("http://192.168.1.10/index.html").unwrap();
        assert!(ensure_ingestion_url_allowed(&url).is_err());
    }

    #[test]
    fn rejects_loopback_and_link_local() {
        assert!(ensure_ingestion_url_allowed(&url::Url::parse("http://127.0.0.1/x").unwrap()).is_err());
        assert!(ensure_ingestion_url_allowed(&url::Url::parse("http://169.254.1.1/x").unwrap()).is_err());
    }

    #[test]
    fn allows_public_domain() {
        let url = url::Url::parse("https://sub.example.com/path").unwrap();
        assert!(ensure_ingestion_url_allowed(&url).is_ok());
    }
}
