/*!
Small helpers shared across the crate.
*/

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SCHEME_AND_BUCKET: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://[^/]*/").unwrap();
}

/// Strip the scheme and bucket from a storage URI, leaving the key the
/// object store addresses. Paths without a scheme pass through unchanged.
pub fn strip_prefix(path: &str) -> String {
    SCHEME_AND_BUCKET.replace(path, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::strip_prefix;

    #[test]
    fn test_strip_s3() {
        assert_eq!(
            strip_prefix("s3://bucket/wh/db/t/metadata/v0.metadata.json"),
            "wh/db/t/metadata/v0.metadata.json"
        );
    }

    #[test]
    fn test_strip_s3a_and_gs() {
        assert_eq!(strip_prefix("s3a://b/key"), "key");
        assert_eq!(strip_prefix("gs://b/key"), "key");
    }

    #[test]
    fn test_plain_path_unchanged() {
        assert_eq!(strip_prefix("wh/db/t/file"), "wh/db/t/file");
    }
}
