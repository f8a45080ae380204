// Adapters layer: concrete implementations for external systems (ADIF text, HTTP, one module per provider).

pub mod adif;
pub mod clublog;
pub mod eqsl;
pub mod http;
pub mod lotw;
pub mod qrz;

use crate::utils::error::{QslError, Result};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Appends `path` to `base` with exactly one slash between them.
pub(crate) fn endpoint_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Resolves a relative link (`../x`, `dir/x`) against a directory-style base URL.
pub(crate) fn resolve_link(base: &str, href: &str) -> Result<String> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    Url::parse(&base)
        .and_then(|url| url.join(href))
        .map(String::from)
        .map_err(|e| QslError::parse(format!("cannot resolve link '{href}' against {base}: {e}")))
}

/// Drops HTML tags and collapses whitespace so marker text can be matched.
pub(crate) fn strip_tags(html: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
    tags.replace_all(html, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("https://a.test/", "/x.cfm"), "https://a.test/x.cfm");
        assert_eq!(endpoint_url("https://a.test/api", "x"), "https://a.test/api/x");
    }

    #[test]
    fn test_resolve_link() {
        assert_eq!(
            resolve_link("https://a.test/qslcard", "../files/log.adi").unwrap(),
            "https://a.test/files/log.adi"
        );
        assert_eq!(
            resolve_link("https://a.test/qslcard/", "files/log.adi").unwrap(),
            "https://a.test/qslcard/files/log.adi"
        );
        assert!(resolve_link("not a url", "x").is_err());
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(
            strip_tags("<H3>Result - QSO on file</H3>\n<BR>Authenticity  Guaranteed"),
            "Result - QSO on file Authenticity Guaranteed"
        );
    }
}
