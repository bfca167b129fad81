//! URL canonicalization and domain scoping
//!
//! Every URL the crawler touches goes through [`normalize`] first, so the
//! visited set compares canonical forms only. Canonical means: lowercase
//! scheme and host (handled by `url`), no default port, no fragment, no empty
//! query, query pairs in sorted order, and no trailing slash except on the
//! root path.

use std::fmt;

use url::Url;

use crate::crawler::error::CrawlError;

/// A URL in canonical form. Two inputs naming the same resource compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    /// Normalize an absolute URL
    pub fn parse(raw: &str) -> Result<Self, CrawlError> {
        normalize(raw, None)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    /// Lowercased extension of the last path segment, if it has one
    pub fn extension(&self) -> Option<String> {
        let segment = self.0.path_segments()?.next_back()?;
        let (stem, ext) = segment.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Whether the path names a PDF document
    pub fn is_pdf(&self) -> bool {
        self.extension().as_deref() == Some("pdf")
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Canonicalize `raw`, resolving it against `base` when it is relative.
///
/// Protocol-relative references (`//host/path`) take the base's scheme.
/// Anything that is not http(s) or lacks a host is rejected.
pub fn normalize(raw: &str, base: Option<&NormalizedUrl>) -> Result<NormalizedUrl, CrawlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CrawlError::invalid_url(raw, "empty URL"));
    }

    let mut url = match base {
        Some(base) => base.0.join(trimmed),
        None => Url::parse(trimmed),
    }
    .map_err(|e| CrawlError::invalid_url(raw, e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CrawlError::invalid_url(
                raw,
                format!("unsupported scheme '{}'", other),
            ));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(CrawlError::invalid_url(raw, "missing host"));
    }

    url.set_fragment(None);

    let query = url.query().map(sorted_query);
    match query {
        Some(query) if !query.is_empty() => url.set_query(Some(&query)),
        _ => url.set_query(None),
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed_path = path.trim_end_matches('/').to_string();
        if trimmed_path.is_empty() {
            url.set_path("/");
        } else {
            url.set_path(&trimmed_path);
        }
    }

    Ok(NormalizedUrl(url))
}

/// Reorder `a=1&b=2` style pairs without re-encoding them
fn sorted_query(query: &str) -> String {
    let mut pairs: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();
    pairs.sort_unstable();
    pairs.join("&")
}

/// True iff `url` lives on exactly the seed's host. Subdomains are out of scope.
pub fn is_in_domain(url: &NormalizedUrl, seed: &NormalizedUrl) -> bool {
    match (url.host(), seed.host()) {
        (Some(host), Some(seed_host)) => host == seed_host,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> String {
        NormalizedUrl::parse(raw).unwrap().to_string()
    }

    #[test]
    fn test_canonical_forms() {
        assert_eq!(norm("HTTPS://Example.COM"), "https://example.com/");
        assert_eq!(norm("https://example.com/about/"), "https://example.com/about");
        assert_eq!(norm("https://example.com/about#team"), "https://example.com/about");
        assert_eq!(norm("https://example.com:443/a"), "https://example.com/a");
        assert_eq!(norm("https://example.com/a?"), "https://example.com/a");
        assert_eq!(norm("https://example.com/a/./b/../c//"), "https://example.com/a/c");
        assert_eq!(
            norm("https://example.com/list?page=2&sort=asc"),
            norm("https://example.com/list?sort=asc&page=2")
        );
    }

    #[test]
    fn test_queries_stay_distinct() {
        assert_ne!(
            norm("https://example.com/list?page=1"),
            norm("https://example.com/list?page=2")
        );
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "https://Example.com/A/B/?z=1&a=2#frag",
            "http://example.com",
            "https://example.com/path//",
            "https://example.com/search?q=hello%20world&&x",
            "https://example.com/ünïcode/päth",
            "https://user@example.com:8080/x/",
        ];
        for input in inputs {
            let once = NormalizedUrl::parse(input).unwrap();
            let twice = NormalizedUrl::parse(once.as_str()).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", input);
        }
    }

    #[test]
    fn test_relative_resolution() {
        let base = NormalizedUrl::parse("https://example.com/docs/guide").unwrap();
        assert_eq!(
            normalize("intro", Some(&base)).unwrap().as_str(),
            "https://example.com/docs/intro"
        );
        assert_eq!(
            normalize("/about/", Some(&base)).unwrap().as_str(),
            "https://example.com/about"
        );
        assert_eq!(
            normalize("//cdn.example.com/x.pdf", Some(&base)).unwrap().as_str(),
            "https://cdn.example.com/x.pdf"
        );
        assert_eq!(
            normalize("#section", Some(&base)).unwrap().as_str(),
            "https://example.com/docs/guide"
        );
    }

    #[test]
    fn test_rejects_non_http() {
        let base = NormalizedUrl::parse("https://example.com/").unwrap();
        for raw in [
            "mailto:someone@example.com",
            "javascript:void(0)",
            "tel:+123456",
            "ftp://example.com/file",
            "data:text/plain,hi",
            "   ",
        ] {
            let result = normalize(raw, Some(&base));
            assert!(
                matches!(result, Err(CrawlError::InvalidUrl { .. })),
                "{} should be rejected",
                raw
            );
        }
        assert!(NormalizedUrl::parse("example.com/no-scheme").is_err());
    }

    #[test]
    fn test_domain_scope() {
        let seed = NormalizedUrl::parse("https://example.com/").unwrap();
        let inside = NormalizedUrl::parse("https://EXAMPLE.com/about").unwrap();
        let sub = NormalizedUrl::parse("https://blog.example.com/").unwrap();
        let other = NormalizedUrl::parse("https://other.test/x").unwrap();
        let http = NormalizedUrl::parse("http://example.com/plain").unwrap();

        assert!(is_in_domain(&inside, &seed));
        assert!(is_in_domain(&http, &seed));
        assert!(!is_in_domain(&sub, &seed));
        assert!(!is_in_domain(&other, &seed));
    }

    #[test]
    fn test_extension() {
        let pdf = NormalizedUrl::parse("https://example.com/files/Brochure.PDF").unwrap();
        assert!(pdf.is_pdf());
        let dir = NormalizedUrl::parse("https://example.com/files.pdf/").unwrap();
        assert!(dir.is_pdf());
        let none = NormalizedUrl::parse("https://example.com/about").unwrap();
        assert_eq!(none.extension(), None);
        let dotfile = NormalizedUrl::parse("https://example.com/.hidden").unwrap();
        assert_eq!(dotfile.extension(), None);
        let image = NormalizedUrl::parse("https://example.com/logo.png?v=2").unwrap();
        assert_eq!(image.extension().as_deref(), Some("png"));
    }
}
