//! Request eligibility for prerendering.
//!
//! Only document navigations are worth a render context: `GET` requests that
//! accept HTML, outside excluded prefixes, and not pointing at an asset file.

use serde::Serialize;

use crate::config::PipelineConfig;

/// Why a request is not prerendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ineligible {
    /// Method other than `GET`.
    Method,
    /// Path ends in a known asset extension.
    Asset,
    /// Path starts with an excluded prefix.
    ExcludedPath,
    /// `Accept` header missing or without an HTML media type.
    NotHtml,
}

impl std::fmt::Display for Ineligible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Ineligible::Method => "method is not GET",
            Ineligible::Asset => "asset path",
            Ineligible::ExcludedPath => "excluded path",
            Ineligible::NotHtml => "client does not accept html",
        };
        f.write_str(reason)
    }
}

/// Check whether a request should go through the render pipeline.
pub fn check_request(
    config: &PipelineConfig,
    method: &str,
    path: &str,
    accept: Option<&str>,
) -> Result<(), Ineligible> {
    if !method.eq_ignore_ascii_case("GET") {
        return Err(Ineligible::Method);
    }
    if is_asset_path(path, &config.asset_extensions) {
        return Err(Ineligible::Asset);
    }
    if config
        .excluded_prefixes
        .iter()
        .any(|prefix| is_under_prefix(path, prefix))
    {
        return Err(Ineligible::ExcludedPath);
    }
    if !accepts_html(accept) {
        return Err(Ineligible::NotHtml);
    }
    Ok(())
}

/// Whether `path` lives under `prefix`.
///
/// `/api` covers `/api` and `/api/users` but not `/apiary`. A prefix ending
/// in `/` or `_` (such as `/_`) matches any path that starts with it.
pub fn is_under_prefix(path: &str, prefix: &str) -> bool {
    if prefix.ends_with(['/', '_']) {
        return path.starts_with(prefix);
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Whether the last path segment carries one of `extensions`.
pub fn is_asset_path(path: &str, extensions: &[String]) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    match segment.rsplit_once('.') {
        Some((_, ext)) => extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

/// Whether an `Accept` header lists an HTML media type.
pub fn accepts_html(accept: Option<&str>) -> bool {
    accept.is_some_and(|value| {
        value.split(',').any(|item| {
            let media = item.split(';').next().unwrap_or_default().trim();
            media.eq_ignore_ascii_case("text/html")
                || media.eq_ignore_ascii_case("application/xhtml+xml")
        })
    })
}
