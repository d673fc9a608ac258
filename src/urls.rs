use regex::Regex;
use tracing::warn;
use url::Url;

/// Schemes the browser loads itself. Anything else is an external protocol.
const ACCEPTED_SCHEMES: &[&str] = &[
    "about",
    "blob",
    "chrome",
    "chrome-native",
    "content",
    "data",
    "devtools",
    "file",
    "filesystem",
    "http",
    "https",
    "javascript",
];

const INTERNAL_SCHEMES: &[&str] = &["about", "chrome", "chrome-native", "devtools"];

pub const WTAI_PREFIX: &str = "wtai://wp/";
pub const WTAI_MAKE_CALL_PREFIX: &str = "wtai://wp/mc;";

const WEB_STORE_HOST: &str = "play.google.com";
const WEB_STORE_DETAILS_PATH: &str = "/store/apps/details";

pub const PAIRING_CODE_PATTERN: &str = r".*youtube\.com(/.*)?\?(.+&)?pairingCode=[^&].+";

/// Lower-cased scheme of `raw`, if it has a syntactically valid one.
pub fn scheme_of(raw: &str) -> Option<String> {
    let (scheme, _) = raw.trim().split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

pub fn is_external_protocol(raw: &str) -> bool {
    match scheme_of(raw) {
        Some(scheme) => !ACCEPTED_SCHEMES.contains(&scheme.as_str()),
        None => false,
    }
}

pub fn is_web_url(raw: &str) -> bool {
    matches!(scheme_of(raw).as_deref(), Some("http" | "https"))
}

/// Privileged browser-internal schemes that must never leave the browser.
pub fn is_internal_scheme(raw: &str) -> bool {
    scheme_of(raw)
        .map(|scheme| INTERNAL_SCHEMES.contains(&scheme.as_str()))
        .unwrap_or(false)
}

pub fn is_content_scheme(raw: &str) -> bool {
    matches!(scheme_of(raw).as_deref(), Some("content"))
}

pub fn is_file_url(raw: &str) -> bool {
    matches!(scheme_of(raw).as_deref(), Some("file"))
}

pub fn is_wtai(raw: &str) -> bool {
    raw.trim().to_ascii_lowercase().starts_with(WTAI_PREFIX)
}

pub fn is_wtai_make_call(raw: &str) -> bool {
    raw.trim().to_ascii_lowercase().starts_with(WTAI_MAKE_CALL_PREFIX)
}

/// A fallback URL is only honoured when it is an absolute http(s) URL with a host.
pub fn parse_safe_fallback(raw: &str) -> Option<Url> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().filter(|host| !host.is_empty())?;
    Some(parsed)
}

pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw.trim())
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_ascii_lowercase()))
        .filter(|host| !host.is_empty())
}

pub fn same_host(left: Option<&str>, right: Option<&str>) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => left.eq_ignore_ascii_case(right),
        _ => false,
    }
}

/// Matches `host` against configured hosts, allowing subdomains of each entry.
pub fn host_matches(host: &str, patterns: &[String]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    patterns.iter().any(|pattern| {
        let pattern = pattern.trim().trim_end_matches('.').to_ascii_lowercase();
        !pattern.is_empty()
            && (host == pattern
                || host
                    .strip_suffix(pattern.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })
}

pub fn is_search_referrer(referrer: Option<&str>, search_hosts: &[String]) -> bool {
    let Some(referrer) = referrer else {
        return false;
    };
    if !is_web_url(referrer) {
        return false;
    }
    host_of(referrer)
        .map(|host| host_matches(&host, search_hosts))
        .unwrap_or(false)
}

/// True when the URL path ends with one of `extensions` (compared case-insensitively).
pub fn has_download_extension(raw: &str, extensions: &[String]) -> bool {
    let Ok(parsed) = Url::parse(raw.trim()) else {
        return false;
    };
    let Some(last) = parsed.path_segments().and_then(|mut segments| segments.next_back()) else {
        return false;
    };
    let Some((_, ext)) = last.rsplit_once('.') else {
        return false;
    };
    extensions
        .iter()
        .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// Package named by a store listing, either `market://details?id=` or the web store page.
pub fn store_listing_package(url: &Url) -> Option<String> {
    let is_listing = match url.scheme() {
        "market" => url.host_str() == Some("details"),
        "http" | "https" => {
            url.host_str() == Some(WEB_STORE_HOST) && url.path() == WEB_STORE_DETAILS_PATH
        }
        _ => false,
    };
    if !is_listing {
        return None;
    }
    url.query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

pub fn web_store_listing(package: &str) -> Option<Url> {
    let mut url = Url::parse(&format!("https://{WEB_STORE_HOST}{WEB_STORE_DETAILS_PATH}")).ok()?;
    url.query_pairs_mut().append_pair("id", package);
    Some(url)
}

/// Deep-link patterns that must stay in the page even when an app claims them.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    patterns: Vec<Regex>,
}

impl DenyList {
    pub fn new(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    warn!(pattern = %pattern, error = %err, "ignoring invalid denylist pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(url))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_external_protocols() {
        assert!(is_external_protocol("intent://scan/#Intent;scheme=zxing;end"));
        assert!(is_external_protocol("market://details?id=com.example"));
        assert!(is_external_protocol("foo://bar"));
        assert!(!is_external_protocol("https://example.com"));
        assert!(!is_external_protocol("HTTP://EXAMPLE.COM"));
        assert!(!is_external_protocol("about:blank"));
        assert!(!is_external_protocol("not a url"));
    }

    #[test]
    fn fallback_must_be_absolute_web_url() {
        assert!(parse_safe_fallback("https://example.com/ok").is_some());
        assert!(parse_safe_fallback("http://example.com").is_some());
        assert!(parse_safe_fallback("javascript:alert(1)").is_none());
        assert!(parse_safe_fallback("/relative/path").is_none());
        assert!(parse_safe_fallback("file:///etc/passwd").is_none());
        assert!(parse_safe_fallback("intent://x#Intent;end").is_none());
    }

    #[test]
    fn search_referrer_allows_subdomains_only() {
        let hosts = vec!["google.com".to_string()];
        assert!(is_search_referrer(Some("https://www.google.com/search?q=x"), &hosts));
        assert!(is_search_referrer(Some("https://google.com/"), &hosts));
        assert!(!is_search_referrer(Some("https://notgoogle.com/"), &hosts));
        assert!(!is_search_referrer(Some("chrome://google.com/"), &hosts));
        assert!(!is_search_referrer(None, &hosts));
    }

    #[test]
    fn store_listing_detects_both_forms() {
        let market = Url::parse("market://details?id=com.example&referrer=abc").unwrap();
        assert_eq!(store_listing_package(&market).as_deref(), Some("com.example"));
        let web = Url::parse("https://play.google.com/store/apps/details?id=com.example").unwrap();
        assert_eq!(store_listing_package(&web).as_deref(), Some("com.example"));
        let other = Url::parse("https://play.google.com/store/search?q=x").unwrap();
        assert!(store_listing_package(&other).is_none());
    }

    #[test]
    fn download_extension_ignores_query() {
        let exts = vec!["pdf".to_string()];
        assert!(has_download_extension("https://example.com/doc.PDF?x=1", &exts));
        assert!(!has_download_extension("https://example.com/doc.html", &exts));
        assert!(!has_download_extension("https://example.com/", &exts));
    }

    #[test]
    fn denylist_skips_bad_patterns() {
        let list = DenyList::new(&[PAIRING_CODE_PATTERN.to_string(), "(".to_string()]);
        assert_eq!(list.len(), 1);
        assert!(list.matches("https://www.youtube.com/tv?pairingCode=1234"));
        assert!(list.matches("https://youtube.com/?a=b&pairingCode=xy"));
        assert!(!list.matches("https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn wtai_prefixes() {
        assert!(is_wtai_make_call("wtai://wp/mc;5551234"));
        assert!(is_wtai("wtai://wp/sd;5551234"));
        assert!(!is_wtai_make_call("wtai://wp/sd;5551234"));
    }
}
