//! The Tag Deleter (C6): transactional local delete plus remote digest-negotiated
//! manifest delete with fallback digests.

use tracing::{info, warn};

use crate::digest::choose_delete_digest;
use crate::persistence::TagStore;
use crate::registry::RegistryClient;
use crate::utils::registry_path;
use crate::RegicacheResult;

/// Deletes a tag both locally and, best-effort, on the remote registry.
pub struct TagDeleter {
    registry: RegistryClient,
    tags: std::sync::Arc<dyn TagStore>,
}

impl TagDeleter {
    /// Builds a deleter over the given registry client and tag store.
    pub fn new(registry: RegistryClient, tags: std::sync::Arc<dyn TagStore>) -> Self {
        Self { registry, tags }
    }

    /// Deletes `(repo_name, image_name, tag_name)`. The local row is gone before any
    /// registry call is attempted, so registry failures are logged, never surfaced — the
    /// database remains the authoritative view (spec.md 4.6).
    pub async fn delete_tag(&self, repo_name: &str, image_name: &str, tag_name: &str) -> RegicacheResult<()> {
        let existing = self
            .tags
            .get(repo_name, image_name, tag_name)
            .await?
            .ok_or_else(|| crate::RegicacheError::NotFound(format!("{repo_name}/{image_name}:{tag_name}")))?;

        let mut candidates = Vec::new();
        if let Some(metadata) = &existing.metadata {
            if !metadata.content_digest.is_empty() {
                candidates.push(metadata.content_digest.clone());
            }
            if !metadata.index_digest.is_empty() {
                candidates.push(metadata.index_digest.clone());
            }
        }
        if !existing.tag.digest.is_empty() {
            candidates.push(existing.tag.digest.clone());
        }

        self.tags.delete(repo_name, image_name, tag_name).await?;

        let path = registry_path(repo_name, image_name);

        if let Ok(response) = self.registry.fetch_manifest_response(&path, tag_name).await {
            if let Ok(fresh) = choose_delete_digest(response.content_digest_header.as_deref(), &response.raw_body) {
                candidates.insert(0, fresh);
            }
        }

        for digest in dedup_preserve_order(candidates) {
            match self.registry.delete_manifest(&path, &digest).await {
                Ok(()) => {
                    info!(repo = %path, tag = %tag_name, %digest, "deleted manifest from registry");
                    return Ok(());
                }
                Err(e) => {
                    warn!(repo = %path, tag = %tag_name, %digest, error = %e, "delete attempt failed, trying next candidate");
                }
            }
        }

        warn!(repo = %path, tag = %tag_name, "all registry delete attempts failed; local row already removed");
        Ok(())
    }
}

fn dedup_preserve_order(digests: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    digests.into_iter().filter(|d| seen.insert(d.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_candidate_digests_preserving_order() {
        let digests = vec!["a".to_owned(), "b".to_owned(), "a".to_owned()];
        assert_eq!(dedup_preserve_order(digests), vec!["a".to_owned(), "b".to_owned()]);
    }
}
