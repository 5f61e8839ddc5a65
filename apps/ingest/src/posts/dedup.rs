//! Canonical URL form used as the dedup key.
//!
//! Two listing items that point at the same resource must produce the same
//! key, otherwise the unique index on `url` cannot catch the duplicate.

use url::Url;

/// Query parameters that never identify a resource.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "gclsrc", "dclid", "igshid", "mc_cid", "mc_eid", "ref_src", "ref_url",
];

/// Canonicalizes an http(s) URL:
/// https scheme, lowercase host, no default port, no fragment, no tracking
/// parameters, no trailing slash (except the root path).
pub fn canonical_url(raw: &str) -> Result<String, String> {
    let mut url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{other}'")),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host".to_string());
    }

    if url.scheme() == "http" {
        url.set_scheme("https")
            .map_err(|_| "cannot switch scheme to https".to_string())?;
    }
    if url.port() == Some(443) || url.port() == Some(80) {
        url.set_port(None)
            .map_err(|_| "cannot clear port".to_string())?;
    }
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Ok(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.starts_with("utm_") || TRACKING_PARAMS.contains(&lower.as_str())
}
