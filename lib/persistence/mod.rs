//! Persistence Port (C4): the narrow interface the core depends on to read and write
//! repositories, images, tags, tag metadata, layers, and key/value app config.
//!
//! The core only ever talks to the four traits below; `sqlite` is one concrete
//! implementation, selected by `bin/main.rs`.

mod db;
mod sqlite;

pub use db::*;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::models::{Image, Repository, Tag};
use crate::RegicacheResult;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Process-wide key/value string config, keyed uniquely. Reserved keys: `registry_url`,
/// `registry_name`, `sync_interval`, `last_sync_time`, `db_version`.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Reads the value for `key`, or `None` if unset.
    async fn get(&self, key: &str) -> RegicacheResult<Option<String>>;

    /// Upserts `key` to `value`.
    async fn update(&self, key: &str, value: &str) -> RegicacheResult<()>;

    /// Lists all key/value pairs.
    async fn list(&self) -> RegicacheResult<Vec<(String, String)>>;
}

/// Repository (namespace) reads and writes.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Lists repositories, most recently modified first, with optional name substring
    /// `search` and `page`/`limit` pagination (`page` is 1-based).
    async fn list(
        &self,
        page: u32,
        limit: u32,
        search: Option<&str>,
    ) -> RegicacheResult<Vec<Repository>>;

    /// Reads a repository by name.
    async fn get(&self, name: &str) -> RegicacheResult<Option<Repository>>;

    /// Inserts a new repository row, returning it with its assigned id and timestamps.
    async fn create(&self, name: &str) -> RegicacheResult<Repository>;

    /// Persists changes to an existing repository (only `last_synced` is ever mutated).
    async fn update(&self, repository: &Repository) -> RegicacheResult<()>;

    /// Deletes a repository and its owned subtree.
    async fn delete(&self, name: &str) -> RegicacheResult<()>;
}

/// Image reads and writes, scoped to a repository.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Lists the images owned by repository `repo_name`.
    async fn list(&self, repo_name: &str) -> RegicacheResult<Vec<Image>>;

    /// Reads an image by (`repo_name`, `image_name`).
    async fn get(&self, repo_name: &str, image_name: &str) -> RegicacheResult<Option<Image>>;

    /// Inserts a new image row under `repository_id`.
    async fn create(&self, repository_id: i64, name: &str, full_name: &str) -> RegicacheResult<Image>;

    /// Persists changes to an existing image.
    async fn update(&self, image: &Image) -> RegicacheResult<()>;

    /// Deletes an image and its owned subtree.
    async fn delete(&self, repo_name: &str, image_name: &str) -> RegicacheResult<()>;
}

/// Tag reads and writes, scoped to a repository + image. `get` eagerly loads metadata and
/// layers; `list` does not.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Lists the tags owned by (`repo_name`, `image_name`), without metadata/layers.
    async fn list(&self, repo_name: &str, image_name: &str) -> RegicacheResult<Vec<Tag>>;

    /// Reads a tag by (`repo_name`, `image_name`, `tag_name`), with metadata and ordered
    /// layers eagerly loaded.
    async fn get(
        &self,
        repo_name: &str,
        image_name: &str,
        tag_name: &str,
    ) -> RegicacheResult<Option<crate::models::TagWithMetadata>>;

    /// Creates the full Tag + TagMetadata + ImageLayer tree under `image_id`, in one
    /// transaction. `metadata` is `None` for a minimal (schema v1 or config-less) tag.
    async fn create(
        &self,
        image_id: i64,
        tag_name: &str,
        digest: &str,
        metadata: Option<&crate::models::NewTagMetadata>,
    ) -> RegicacheResult<Tag>;

    /// Replaces `tag`'s digest and, if present, its metadata + layer set, under one
    /// transaction.
    async fn update(
        &self,
        tag: &Tag,
        metadata: Option<&crate::models::NewTagMetadata>,
    ) -> RegicacheResult<()>;

    /// Deletes TagMetadata then Tag for (`repo_name`, `image_name`, `tag_name`), local
    /// store only — the registry side is the Tag Deleter's responsibility.
    async fn delete(&self, repo_name: &str, image_name: &str, tag_name: &str) -> RegicacheResult<()>;
}
