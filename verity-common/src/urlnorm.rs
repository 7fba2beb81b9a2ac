use url::Url;

/// Tracking query parameter names/prefixes dropped during canonicalization.
const TRACKING_EXACT: &[&str] = &["gclid", "fbclid", "mc_cid", "mc_eid", "ref", "ref_src"];
const TRACKING_PREFIX: &str = "utm_";

/// Canonicalizes a URL:
/// - lowercase scheme + host
/// - drop fragment
/// - drop tracking params (utm_*, gclid, fbclid, mc_cid, mc_eid, ref, ref_src)
/// - sort remaining query params alphabetically
/// - trim trailing slash except root
pub fn canonicalize(raw: &str) -> Result<String, url::ParseError> {
    let with_scheme = ensure_scheme(raw);
    let mut url = Url::parse(&with_scheme)?;

    url.set_fragment(None);

    let lower_scheme = url.scheme().to_ascii_lowercase();
    let _ = url.set_scheme(&lower_scheme);

    if let Some(host) = url.host_str() {
        let lower_host = host.to_ascii_lowercase();
        let _ = url.set_host(Some(&lower_host));
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }

    Ok(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.starts_with(TRACKING_PREFIX) || TRACKING_EXACT.contains(&lower.as_str())
}

fn ensure_scheme(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Extracts the registrable-ish host for domain allow/deny suffix matching
/// for post-filtering search results by an allow/deny hostname list.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// True if `host` equals `suffix` or ends with `.{suffix}`.
pub fn host_matches_suffix(host: &str, suffix: &str) -> bool {
    let suffix = suffix.trim_start_matches('.').to_ascii_lowercase();
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tracking_params_and_sorts_remaining() {
        let canon = canonicalize(
            "HTTPS://Example.COM/a/?utm_source=x&b=2&a=1#frag",
        )
        .unwrap();
        assert_eq!(canon, "https://example.com/a?a=1&b=2");
    }

    #[test]
    fn strips_ref_src() {
        let canon = canonicalize("https://example.com/a?a=1&ref_src=twsrc").unwrap();
        assert_eq!(canon, "https://example.com/a?a=1");
    }

    #[test]
    fn matches_already_canonical_url() {
        let canon = canonicalize("https://example.com/a?a=1&b=2").unwrap();
        assert_eq!(canon, "https://example.com/a?a=1&b=2");
    }

    #[test]
    fn is_idempotent() {
        let once = canonicalize("HTTPS://Example.COM/a/?utm_source=x&b=2&a=1#frag").unwrap();
        let twice = canonicalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn keeps_root_trailing_slash() {
        let canon = canonicalize("https://example.com/").unwrap();
        assert_eq!(canon, "https://example.com/");
    }

    #[test]
    fn trims_non_root_trailing_slash() {
        let canon = canonicalize("https://example.com/a/").unwrap();
        assert_eq!(canon, "https://example.com/a");
    }

    #[test]
    fn defaults_missing_scheme_to_https() {
        let canon = canonicalize("example.com/a").unwrap();
        assert_eq!(canon, "https://example.com/a");
    }

    #[test]
    fn host_suffix_matching() {
        assert!(host_matches_suffix("sub.example.com", "example.com"));
        assert!(host_matches_suffix("example.com", "example.com"));
        assert!(!host_matches_suffix("notexample.com", "example.com"));
    }
}
