//! Domain models mirroring the persisted relational graph: repository -> image -> tag ->
//! tag metadata -> image layers, plus the flat app-config key/value table.

use chrono::{DateTime, Utc};
use serde::Serialize;

//--------------------------------------------------------------------------------------------------
// Types: Repository / Image / Tag
//--------------------------------------------------------------------------------------------------

/// A registry namespace. When a registry path has no `/`, the synthetic namespace is
/// `library`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Repository {
    /// Unique identifier for the repository.
    pub id: i64,

    /// The namespace name, e.g. `library` or `acme`.
    pub name: String,

    /// Wall-clock time of the last successful per-repository sync pass.
    pub last_synced: Option<DateTime<Utc>>,

    /// When the repository row was created.
    pub created_at: DateTime<Utc>,

    /// When the repository row was last modified.
    pub modified_at: DateTime<Utc>,
}

/// An image within a repository. Uniqueness: (`repository_id`, `name`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    /// Unique identifier for the image.
    pub id: i64,

    /// The repository this image belongs to.
    pub repository_id: i64,

    /// The path component after the namespace, e.g. `api` in `acme/api`.
    pub name: String,

    /// The original registry path including namespace, e.g. `acme/api`.
    pub full_name: String,

    /// When the image row was created.
    pub created_at: DateTime<Utc>,

    /// When the image row was last modified.
    pub modified_at: DateTime<Utc>,
}

/// A tag within an image. Uniqueness: (`image_id`, `name`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    /// Unique identifier for the tag.
    pub id: i64,

    /// The image this tag belongs to.
    pub image_id: i64,

    /// The tag name, e.g. `latest`.
    pub name: String,

    /// The config digest of the resolved platform manifest, or empty when the manifest
    /// has no config (schema v1 fallback).
    pub digest: String,

    /// When this tag row was inserted.
    pub created_at: DateTime<Utc>,
}

//--------------------------------------------------------------------------------------------------
// Types: TagMetadata / ImageLayer
//--------------------------------------------------------------------------------------------------

/// Image-config-derived attributes for a tag. Owns an ordered list of `ImageLayer`s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagMetadata {
    /// Unique identifier for the metadata row.
    pub id: i64,

    /// The tag this metadata belongs to.
    pub tag_id: i64,

    /// The image-config-reported creation timestamp string, stored unchanged.
    pub created: String,

    /// The image-config `os` field.
    pub os: String,

    /// The image-config `architecture` field.
    pub architecture: String,

    /// The resolved author, see `normalize::resolve_author`.
    pub author: String,

    /// The working directory from the image config.
    pub work_dir: String,

    /// Space-joined `Cmd` array.
    pub command: String,

    /// Space-joined `Entrypoint` array.
    pub entrypoint: String,

    /// Comma-joined exposed port keys.
    pub exposed_ports: String,

    /// Total size in bytes, taken from `manifest.config.size`.
    pub total_size: i64,

    /// Synthesized Dockerfile, see `normalize::synthesize_dockerfile`.
    pub docker_file: String,

    /// The digest of the image config blob (empty if the manifest carried no config).
    pub config_digest: String,

    /// The digest of the resolved single-platform manifest.
    pub content_digest: String,

    /// The digest of the top-level index, if the tag resolved through one.
    pub index_digest: String,

    /// Whether the resolved manifest used OCI (vs. Docker) media types.
    pub is_oci: bool,

    /// When this metadata row was created.
    pub created_at: DateTime<Utc>,

    /// When this metadata row was last modified.
    pub modified_at: DateTime<Utc>,
}

/// A single layer descriptor belonging to a `TagMetadata`, in manifest layer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageLayer {
    /// Unique identifier for the layer row.
    pub id: i64,

    /// The tag metadata this layer belongs to.
    pub tag_metadata_id: i64,

    /// Ordinal position within the manifest's layer list, starting at 0.
    pub position: i64,

    /// The layer size in bytes.
    pub size: i64,

    /// The layer digest.
    pub digest: String,
}

//--------------------------------------------------------------------------------------------------
// Types: composite read shapes
//--------------------------------------------------------------------------------------------------

/// A tag together with its metadata and ordered layers, as returned by `TagStore::get`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagWithMetadata {
    /// The tag row.
    pub tag: Tag,

    /// The tag's metadata, absent only for schema-v1 tags with no config.
    pub metadata: Option<TagMetadata>,

    /// The metadata's ordered layers; empty when `metadata` is `None`.
    pub layers: Vec<ImageLayer>,
}

/// The fields needed to create or update a tag's full tree in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTagMetadata {
    /// Image-config-reported creation timestamp string.
    pub created: String,
    /// Operating system.
    pub os: String,
    /// Architecture.
    pub architecture: String,
    /// Resolved author.
    pub author: String,
    /// Working directory.
    pub work_dir: String,
    /// Space-joined command.
    pub command: String,
    /// Space-joined entrypoint.
    pub entrypoint: String,
    /// Comma-joined exposed ports.
    pub exposed_ports: String,
    /// Total size in bytes.
    pub total_size: i64,
    /// Synthesized Dockerfile.
    pub docker_file: String,
    /// Config blob digest.
    pub config_digest: String,
    /// Resolved single-platform manifest digest.
    pub content_digest: String,
    /// Top-level index digest, if any.
    pub index_digest: String,
    /// Whether the manifest was OCI media type.
    pub is_oci: bool,
    /// Ordered layer (size, digest) pairs.
    pub layers: Vec<(i64, String)>,
}

impl NewTagMetadata {
    /// Compares the tracked mutable fields (per spec.md 4.5) against an existing
    /// `TagMetadata` + layer set, for change detection during reconciliation.
    pub fn differs_from(&self, existing: &TagMetadata, existing_layers: &[ImageLayer]) -> bool {
        if self.author != existing.author
            || self.docker_file != existing.docker_file
            || self.command != existing.command
            || self.entrypoint != existing.entrypoint
            || self.work_dir != existing.work_dir
            || self.os != existing.os
            || self.architecture != existing.architecture
        {
            return true;
        }

        if self.layers.len() != existing_layers.len() {
            return true;
        }

        self.layers
            .iter()
            .zip(existing_layers.iter())
            .any(|((size, digest), layer)| *size != layer.size || digest != &layer.digest)
    }
}
