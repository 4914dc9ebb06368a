//! Path normalization and client route derivation.

/// Normalize a request path for registry lookups.
///
/// Drops query and fragment, guarantees a leading slash, collapses repeated
/// slashes, and strips a trailing slash (except for the root).
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}

/// Last non-empty segment of a path.
pub fn last_segment(path: &str) -> Option<&str> {
    path.split(['?', '#'])
        .next()
        .unwrap_or_default()
        .split('/')
        .filter(|s| !s.is_empty())
        .next_back()
}

/// Client route name for a request path.
///
/// A recognized last segment maps to itself; anything else (including the
/// root) maps to `home`.
pub fn route_name(path: &str, known_routes: &[String], home: &str) -> String {
    last_segment(path)
        .and_then(|segment| known_routes.iter().find(|route| route.as_str() == segment))
        .map_or_else(|| home.to_string(), Clone::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec!["about".to_string(), "posts".to_string()]
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/posts/"), "/posts");
        assert_eq!(normalize_path("posts//42"), "/posts/42");
        assert_eq!(normalize_path("/posts?page=2#top"), "/posts");
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("/"), None);
        assert_eq!(last_segment("/blog/posts/"), Some("posts"));
        assert_eq!(last_segment("/about?x=1"), Some("about"));
    }

    #[test]
    fn test_known_route_maps_directly() {
        assert_eq!(route_name("/about", &known(), "home"), "about");
        assert_eq!(route_name("/blog/posts/", &known(), "home"), "posts");
    }

    #[test]
    fn test_unknown_route_defaults_to_home() {
        assert_eq!(route_name("/", &known(), "home"), "home");
        assert_eq!(route_name("/missing", &known(), "home"), "home");
        assert_eq!(route_name("/posts/42", &known(), "home"), "home");
    }
}
