//! Bare-hostname normalization shared by the host filter and the tolerant
//! entry extractor.

/// Normalizes a raw host/URL/identifier string to a bare lowercase
/// hostname, or `None` if nothing usable remains.
pub fn normalize_host_fragment(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let host_and_port = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme);
    let host = host_and_port.rsplit_once(':').map(|(h, _)| h).unwrap_or(host_and_port);
    let normalized = host
        .trim()
        .trim_matches('.')
        .to_ascii_lowercase();
    if normalized.is_empty() || !normalized.contains('.') {
        return None;
    }
    Some(normalized)
}

/// Extracts the explicit `http`/`https` scheme from a raw whitelist entry's
/// own URL, or `None` when the entry carries no scheme (caller falls back
/// to the protocol fetcher's `https`-by-default rule).
pub fn extract_scheme(raw: &str) -> Option<&'static str> {
    let trimmed = raw.trim();
    if trimmed.starts_with("https://") {
        Some("https")
    } else if trimmed.starts_with("http://") {
        Some("http")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_normalize_strips_scheme_path_port_and_dots() {
        assert_eq!(
            normalize_host_fragment("https://A.Example.org:443/videos"),
            Some("a.example.org".to_string())
        );
        assert_eq!(normalize_host_fragment(" .b.example.org. "), Some("b.example.org".to_string()));
    }

    #[test]
    fn unit_normalize_rejects_empty_and_bare_identifiers() {
        assert_eq!(normalize_host_fragment(""), None);
        assert_eq!(normalize_host_fragment("12345"), None);
    }

    #[test]
    fn unit_extract_scheme_reads_explicit_http_or_https_only() {
        assert_eq!(extract_scheme("https://a.example.org"), Some("https"));
        assert_eq!(extract_scheme("http://a.example.org"), Some("http"));
        assert_eq!(extract_scheme("a.example.org"), None);
    }
}
