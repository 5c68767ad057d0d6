//! Preview-location extraction.
//!
//! Servers report the rendered artifact of a job under a handful of
//! synonymous keys, either nested under `data` or at the top level, and the
//! values are not always well-formed. Extraction is lenient: a candidate is
//! repaired into an `https` URL where that is obvious and forwarded otherwise.

use serde_json::Value;
use url::Url;

/// Field names that may carry a preview location, in lookup order.
pub const PREVIEW_FIELDS: [&str; 4] = ["preview_url", "previewUrl", "url", "preview"];

/// Find a preview location in a parsed frame.
///
/// The nested `data` object is searched before the top level. Non-string and
/// blank values are skipped.
pub fn extract_preview_url(frame: &Value) -> Option<String> {
    let nested = frame.get("data").and_then(find_candidate);
    nested
        .or_else(|| find_candidate(frame))
        .map(normalize_preview_url)
}

fn find_candidate(object: &Value) -> Option<&str> {
    PREVIEW_FIELDS.iter().find_map(|field| {
        object
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|candidate| !candidate.is_empty())
    })
}

/// Repair a candidate preview location.
///
/// Well-formed `http`/`https` URLs and URLs with any other scheme are returned
/// unchanged. Strings that do not parse are repaired:
/// protocol-relative `//host/path` gains `https:`, and anything without an
/// `http://` or `https://` prefix gains `https://`.
pub fn normalize_preview_url(candidate: &str) -> String {
    match Url::parse(candidate) {
        Ok(url) => {
            if !matches!(url.scheme(), "http" | "https") {
                tracing::debug!(scheme = url.scheme(), "Preview URL has non-web scheme");
            }
            candidate.to_string()
        }
        Err(_) if candidate.starts_with("//") => format!("https:{candidate}"),
        Err(_) if !has_web_scheme(candidate) => format!("https://{candidate}"),
        Err(e) => {
            tracing::debug!(error = %e, "Forwarding unparseable preview URL as-is");
            candidate.to_string()
        }
    }
}

fn has_web_scheme(candidate: &str) -> bool {
    let lower = candidate.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_formed_url_is_kept() {
        assert_eq!(
            normalize_preview_url("https://cdn.example.com/x?v=2"),
            "https://cdn.example.com/x?v=2"
        );
        assert_eq!(normalize_preview_url("http://localhost:3000/p"), "http://localhost:3000/p");
    }

    #[test]
    fn test_protocol_relative_gets_https() {
        assert_eq!(
            normalize_preview_url("//cdn.example.com/x"),
            "https://cdn.example.com/x"
        );
    }

    #[test]
    fn test_bare_host_gets_https_prefix() {
        assert_eq!(
            normalize_preview_url("preview.example.com/job/7"),
            "https://preview.example.com/job/7"
        );
    }

    #[test]
    fn test_broken_http_url_passes_through() {
        // Parses neither as-is nor after repair; forwarded untouched.
        assert_eq!(normalize_preview_url("http://"), "http://");
    }

    #[test]
    fn test_nested_field_wins_over_top_level() {
        let frame = json!({
            "url": "https://top.example.com",
            "data": { "previewUrl": "https://nested.example.com" }
        });
        assert_eq!(
            extract_preview_url(&frame).as_deref(),
            Some("https://nested.example.com")
        );
    }

    #[test]
    fn test_field_priority_within_object() {
        let frame = json!({ "preview": "https://b.example.com", "preview_url": "https://a.example.com" });
        assert_eq!(extract_preview_url(&frame).as_deref(), Some("https://a.example.com"));
    }

    #[test]
    fn test_blank_and_non_string_candidates_are_skipped() {
        let frame = json!({ "data": { "preview_url": "  ", "url": 12 }, "preview": null });
        assert_eq!(extract_preview_url(&frame), None);
    }
}
