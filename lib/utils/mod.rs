//! Small shared helpers used across the reconciliation and HTTP layers.

/// Builds the registry path for a (namespace, image) pair: bare `imageName` when the
/// namespace is the synthetic `library` default, else `{namespace}/{imageName}`
/// (spec.md 4.6 step 4).
pub fn registry_path(namespace: &str, image_name: &str) -> String {
    if namespace == crate::reconciler::DEFAULT_NAMESPACE {
        image_name.to_owned()
    } else {
        format!("{namespace}/{image_name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_image_for_library_namespace() {
        assert_eq!(registry_path("library", "alpine"), "alpine");
    }

    #[test]
    fn namespaced_path_otherwise() {
        assert_eq!(registry_path("acme", "api"), "acme/api");
    }
}
