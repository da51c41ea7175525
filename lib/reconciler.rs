//! The Reconciler (C5): the periodic single-flight sync loop that walks the registry
//! graph and applies incremental diffs to the persisted store.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::digest;
use crate::models::NewTagMetadata;
use crate::normalize::normalize_tag_metadata;
use crate::persistence::{ConfigStore, ImageStore, RepositoryStore, TagStore};
use crate::registry::{
    first_resolvable_entry, IndexManifest, Manifest, RegistryClient, OCI_INDEX_V1, UNKNOWN_PLATFORM,
};
use crate::{RegicacheError, RegicacheResult};

/// The synthetic namespace used when a registry path has no `/` (spec.md 3).
pub const DEFAULT_NAMESPACE: &str = "library";

/// The single-flight periodic sync engine.
#[derive(Clone)]
pub struct Reconciler {
    registry: RegistryClient,
    repositories: Arc<dyn RepositoryStore>,
    images: Arc<dyn ImageStore>,
    tags: Arc<dyn TagStore>,
    config: Arc<dyn ConfigStore>,
    syncing: Arc<Mutex<bool>>,
}

impl Reconciler {
    /// Builds a reconciler over the given registry client and persistence ports.
    pub fn new(
        registry: RegistryClient,
        repositories: Arc<dyn RepositoryStore>,
        images: Arc<dyn ImageStore>,
        tags: Arc<dyn TagStore>,
        config: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            registry,
            repositories,
            images,
            tags,
            config,
            syncing: Arc::new(Mutex::new(false)),
        }
    }

    /// Reconciles the entire registry graph into the local store. At most one invocation
    /// runs at a time; a concurrent call fails immediately with `SyncBusy`.
    pub async fn perform_sync(&self) -> RegicacheResult<()> {
        {
            let mut guard = self.syncing.lock().await;
            if *guard {
                return Err(RegicacheError::SyncBusy);
            }
            *guard = true;
        }

        let result = self.run_sync().await;

        *self.syncing.lock().await = false;
        result
    }

    async fn run_sync(&self) -> RegicacheResult<()> {
        let now = Utc::now().timestamp().to_string();
        self.config.update("last_sync_time", &now).await?;

        let repositories = self.registry.list_repositories().await.map_err(|e| {
            RegicacheError::RegistryUnavailable(e.to_string())
        })?;

        info!(count = repositories.len(), "starting sync pass");

        for path in &repositories {
            if let Err(e) = self.sync_repository(path).await {
                warn!(repo = %path, error = %e, "repository sync failed, skipping");
            }
        }

        Ok(())
    }

    /// Splits, upserts, and syncs one registry path's tags (spec.md 4.5 `syncRepository`).
    async fn sync_repository(&self, path: &str) -> RegicacheResult<()> {
        let (namespace, image_name) = split_namespace(path);

        let repository = match self.repositories.get(&namespace).await? {
            Some(repo) => repo,
            None => self.repositories.create(&namespace).await?,
        };

        let image = match self.images.get(&namespace, &image_name).await? {
            Some(image) => image,
            None => self.images.create(repository.id, &image_name, path).await?,
        };

        let tag_names = self.registry.list_tags(path).await?;

        for tag_name in &tag_names {
            if let Err(e) = self.sync_tag(&namespace, &image_name, path, tag_name).await {
                warn!(repo = %path, tag = %tag_name, error = %e, "tag sync failed, skipping");
            }
        }

        let mut repository = repository;
        repository.last_synced = Some(Utc::now());
        self.repositories.update(&repository).await?;

        Ok(())
    }

    /// Resolves one tag's manifest(s) and dispatches to `process_manifest` (spec.md 4.5
    /// `syncTag`).
    ///
    /// Entries fetched by digest reference (`GetManifest(path, entry.digest)`) are
    /// content-addressed, so that digest *is* the resolved manifest's digest — only the
    /// top-level fetch-by-tag-name needs `ChooseDeleteDigest` to learn its digest.
    async fn sync_tag(
        &self,
        namespace: &str,
        image_name: &str,
        path: &str,
        tag_name: &str,
    ) -> RegicacheResult<()> {
        let response = match self.registry.fetch_manifest_response(path, tag_name).await {
            Ok(response) => response,
            Err(e) if e.is_registry_not_found() => {
                debug!(repo = %path, tag = %tag_name, "tag vanished before fetch, skipping");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let top_level_digest =
            digest::choose_delete_digest(response.content_digest_header.as_deref(), &response.raw_body)
                .unwrap_or_default();

        match response.manifest {
            Manifest::Single(single) => {
                self.process_manifest(
                    namespace, image_name, path, tag_name,
                    Manifest::Single(single), top_level_digest, String::new(),
                )
                .await
            }

            // An OCI image-index is transparently descended here exactly as
            // `RegistryClient::get_manifest` would, so the resolved tag carries no
            // index digest (the descent is invisible to the stored record).
            Manifest::Index(index) if index.media_type == OCI_INDEX_V1 => {
                match first_resolvable_entry(&index) {
                    Some(entry) => {
                        let digest = entry.digest.clone();
                        let fetched = self.registry.get_manifest(path, &digest).await?;
                        self.process_manifest(
                            namespace, image_name, path, tag_name, fetched, digest, String::new(),
                        )
                        .await
                    }
                    None => {
                        self.process_manifest(
                            namespace, image_name, path, tag_name,
                            Manifest::Index(index), String::new(), top_level_digest,
                        )
                        .await
                    }
                }
            }

            // A Docker manifest list is iterated explicitly: every entry is fetched and
            // processed in turn, each write sharing the list's own digest as its index digest.
            Manifest::Index(index) => {
                for entry in &index.manifests {
                    let fetched = match self.registry.get_manifest(path, &entry.digest).await {
                        Ok(m) => m,
                        Err(e) => {
                            warn!(repo = %path, tag = %tag_name, digest = %entry.digest, error = %e, "index entry fetch failed, skipping");
                            continue;
                        }
                    };

                    if let Err(e) = self
                        .process_manifest(
                            namespace, image_name, path, tag_name,
                            fetched, entry.digest.clone(), top_level_digest.clone(),
                        )
                        .await
                    {
                        warn!(repo = %path, tag = %tag_name, digest = %entry.digest, error = %e, "index entry processing failed, skipping");
                    }
                }
                Ok(())
            }
        }
    }

    /// Resolves a (possibly still-index) manifest to a single platform manifest, fetches
    /// its config, normalizes, diffs, and applies (spec.md 4.5 `processManifest`).
    fn process_manifest<'a>(
        &'a self,
        namespace: &'a str,
        image_name: &'a str,
        path: &'a str,
        tag_name: &'a str,
        manifest: Manifest,
        content_digest: String,
        index_digest: String,
    ) -> BoxFuture<'a, RegicacheResult<()>> {
        Box::pin(async move {
            let (single, content_digest) = match manifest {
                Manifest::Index(index) => {
                    let entry = pick_fallback_entry(&index)
                        .ok_or_else(|| RegicacheError::NoValidManifest(path.to_owned(), tag_name.to_owned()))?
                        .clone();

                    let resolved = self.registry.get_manifest(path, &entry.digest).await?;
                    match resolved {
                        Manifest::Single(mut s) => {
                            if s.platform.is_none() {
                                s.platform = entry.platform.clone();
                            }
                            (s, entry.digest.clone())
                        }
                        Manifest::Index(nested) => {
                            return self
                                .process_manifest(
                                    namespace, image_name, path, tag_name,
                                    Manifest::Index(nested), String::new(), index_digest,
                                )
                                .await;
                        }
                    }
                }
                Manifest::Single(single) => (single, content_digest),
            };

            let Some(config_descriptor) = single.config.clone() else {
                self.apply_minimal_tag(namespace, image_name, tag_name, "").await?;
                return Ok(());
            };

            let config = match self.registry.get_config(path, &config_descriptor.digest).await {
                Ok(config) => config,
                Err(e) if e.is_registry_not_found() => {
                    self.apply_minimal_tag(namespace, image_name, tag_name, &config_descriptor.digest)
                        .await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let candidate = normalize_tag_metadata(
                &single,
                &config,
                &config_descriptor.digest,
                &content_digest,
                &index_digest,
            );

            self.apply_tag(namespace, image_name, tag_name, &config_descriptor.digest, &candidate)
                .await
        })
    }

    async fn apply_minimal_tag(
        &self,
        namespace: &str,
        image_name: &str,
        tag_name: &str,
        digest: &str,
    ) -> RegicacheResult<()> {
        match self.tags.get(namespace, image_name, tag_name).await? {
            Some(existing) if existing.tag.digest == digest => Ok(()),
            Some(mut existing) => {
                existing.tag.digest = digest.to_owned();
                self.tags.update(&existing.tag, None).await
            }
            None => {
                let image = self
                    .images
                    .get(namespace, image_name)
                    .await?
                    .ok_or_else(|| RegicacheError::NotFound(format!("{namespace}/{image_name}")))?;
                self.tags.create(image.id, tag_name, digest, None).await?;
                Ok(())
            }
        }
    }

    async fn apply_tag(
        &self,
        namespace: &str,
        image_name: &str,
        tag_name: &str,
        digest: &str,
        candidate: &NewTagMetadata,
    ) -> RegicacheResult<()> {
        match self.tags.get(namespace, image_name, tag_name).await? {
            None => {
                let image = self
                    .images
                    .get(namespace, image_name)
                    .await?
                    .ok_or_else(|| RegicacheError::NotFound(format!("{namespace}/{image_name}")))?;
                self.tags.create(image.id, tag_name, digest, Some(candidate)).await?;
                Ok(())
            }
            Some(existing) => {
                let digest_changed = existing.tag.digest != digest;
                let metadata_changed = match &existing.metadata {
                    Some(metadata) => candidate.differs_from(metadata, &existing.layers),
                    None => true,
                };

                if !digest_changed && !metadata_changed {
                    return Ok(());
                }

                let mut tag = existing.tag;
                tag.digest = digest.to_owned();
                self.tags.update(&tag, Some(candidate)).await
            }
        }
    }
}

/// Splits a registry path on its first `/`: the prefix is the namespace, the suffix the
/// image name. Paths without `/` use the synthetic `library` namespace.
pub fn split_namespace(path: &str) -> (String, String) {
    match path.split_once('/') {
        Some((namespace, image)) => (namespace.to_owned(), image.to_owned()),
        None => (DEFAULT_NAMESPACE.to_owned(), path.to_owned()),
    }
}

/// Picks the target entry for a double-wrapped index: the first whose media type does
/// not contain `attestation` and whose platform is neither unknown OS nor architecture;
/// falling back to the first non-attestation entry (spec.md 4.5 `processManifest` step 1).
fn pick_fallback_entry(index: &IndexManifest) -> Option<&crate::registry::IndexEntry> {
    index
        .manifests
        .iter()
        .find(|e| {
            !e.media_type.contains("attestation")
                && e.platform.as_ref().is_some_and(|p| {
                    p.os != UNKNOWN_PLATFORM && p.architecture != UNKNOWN_PLATFORM
                })
        })
        .or_else(|| index.manifests.iter().find(|e| !e.media_type.contains("attestation")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_bare_path_into_library_namespace() {
        assert_eq!(split_namespace("alpine"), ("library".to_owned(), "alpine".to_owned()));
    }

    #[test]
    fn splits_namespaced_path() {
        assert_eq!(split_namespace("acme/api"), ("acme".to_owned(), "api".to_owned()));
    }

    #[test]
    fn splits_on_first_slash_only() {
        assert_eq!(
            split_namespace("acme/api/v2"),
            ("acme".to_owned(), "api/v2".to_owned())
        );
    }
}
