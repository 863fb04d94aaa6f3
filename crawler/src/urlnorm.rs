use url::Url;

/// Link schemes that are never crawlable.
const SKIPPED_SCHEMES: [&str; 3] = ["mailto:", "tel:", "javascript:"];

/// Resolve `link` against `base` into a crawlable absolute URL: whitespace
/// trimmed, fragment dropped, non-HTTP schemes rejected. Returns `None` for
/// anything that should not enter the frontier.
pub fn normalize(base: &Url, link: &str) -> Option<Url> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    if SKIPPED_SCHEMES
        .iter()
        .any(|scheme| link.to_ascii_lowercase().starts_with(scheme))
    {
        return None;
    }
    let mut resolved = base.join(link).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved)
}

/// Parse a seed into its normalized form, trying an `https://` prefix for
/// bare hostnames.
pub fn parse_seed(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut url = Url::parse(raw)
        .or_else(|_| Url::parse(&format!("https://{raw}")))
        .ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// `scheme://host[:port]`, the unit of robots caching and crawl-delay pacing.
pub fn origin_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

/// The path a robots rule is matched against: path-or-slash, plus the query
/// when one exists.
pub fn robots_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// True when both URLs point at the same host and port.
pub fn same_host(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port() == b.port()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn resolves_relative_links_and_strips_fragments() {
        let url = normalize(&base("http://a/x/"), "../y?q=1#f").unwrap();
        assert_eq!(url.as_str(), "http://a/y?q=1");
    }

    #[test]
    fn rejects_non_crawlable_links() {
        let b = base("http://a/");
        assert!(normalize(&b, "mailto:x@y").is_none());
        assert!(normalize(&b, "tel:+123456").is_none());
        assert!(normalize(&b, "javascript:void(0)").is_none());
        assert!(normalize(&b, "JavaScript:alert(1)").is_none());
        assert!(normalize(&b, "").is_none());
        assert!(normalize(&b, "   ").is_none());
        assert!(normalize(&b, "ftp://a/file").is_none());
    }

    #[test]
    fn trims_whitespace_before_resolving() {
        let url = normalize(&base("http://a/"), "  /page ").unwrap();
        assert_eq!(url.as_str(), "http://a/page");
    }

    #[test]
    fn seed_parsing_accepts_bare_hosts() {
        assert_eq!(
            parse_seed("example.com").unwrap().as_str(),
            "https://example.com/"
        );
        assert_eq!(
            parse_seed("http://a/x#frag").unwrap().as_str(),
            "http://a/x"
        );
        assert!(parse_seed("").is_none());
    }

    #[test]
    fn origin_keys_keep_explicit_ports() {
        assert_eq!(origin_key(&base("http://a/x/y")), "http://a");
        assert_eq!(origin_key(&base("http://a:8080/x")), "http://a:8080");
        assert_eq!(origin_key(&base("https://a/")), "https://a");
    }

    #[test]
    fn robots_paths_include_the_query() {
        assert_eq!(robots_path(&base("http://a/x/y")), "/x/y");
        assert_eq!(robots_path(&base("http://a")), "/");
        assert_eq!(robots_path(&base("http://a/search?q=1")), "/search?q=1");
    }

    #[test]
    fn same_host_compares_host_and_port() {
        assert!(same_host(&base("http://a/x"), &base("http://a/y")));
        assert!(!same_host(&base("http://a/x"), &base("http://b/x")));
        assert!(!same_host(&base("http://a/x"), &base("http://a:81/x")));
    }
}
