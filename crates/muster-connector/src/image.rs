//! Image reference parsing.

/// Split an image reference string into `(reference, version)`.
///
/// Platforms encode the base image and its version in one string in two
/// forms:
///
/// - `registry/path@digest` — everything before the `@` is the reference,
///   everything after it is the version.
/// - `registry/path:tag` — the last `:` separates the tag, unless the text
///   after it contains a `/`, which means the colon belongs to a registry
///   port and no tag is present. Without a tag the version is the literal
///   `"latest"`.
#[must_use]
pub fn split_image_reference(reference: &str) -> (String, String) {
    if let Some((image, digest)) = reference.split_once('@') {
        return (image.to_string(), digest.to_string());
    }

    if let Some(idx) = reference.rfind(':') {
        let suffix = &reference[idx + 1..];
        if !suffix.is_empty() && !suffix.contains('/') {
            return (reference[..idx].to_string(), suffix.to_string());
        }
    }

    (reference.to_string(), "latest".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tag() {
        assert_eq!(
            split_image_reference("nginx:1.19"),
            ("nginx".to_string(), "1.19".to_string())
        );
    }

    #[test]
    fn no_tag_defaults_to_latest() {
        assert_eq!(
            split_image_reference("nginx"),
            ("nginx".to_string(), "latest".to_string())
        );
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        assert_eq!(
            split_image_reference("registry.example.com:5000/nginx:1.19"),
            ("registry.example.com:5000/nginx".to_string(), "1.19".to_string())
        );
        assert_eq!(
            split_image_reference("registry.example.com:5000/nginx"),
            ("registry.example.com:5000/nginx".to_string(), "latest".to_string())
        );
    }

    #[test]
    fn digest_splits_on_at() {
        assert_eq!(
            split_image_reference("nginx@sha256:abc123"),
            ("nginx".to_string(), "sha256:abc123".to_string())
        );
    }

    #[test]
    fn digest_wins_over_tag_heuristics() {
        assert_eq!(
            split_image_reference("registry.example.com:5000/nginx@sha256:abc123"),
            (
                "registry.example.com:5000/nginx".to_string(),
                "sha256:abc123".to_string()
            )
        );
    }

    #[test]
    fn trailing_colon_defaults_to_latest() {
        assert_eq!(
            split_image_reference("nginx:"),
            ("nginx:".to_string(), "latest".to_string())
        );
    }
}
