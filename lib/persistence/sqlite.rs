//! The concrete SQLite-backed implementation of the Persistence Port (C4), in the
//! teacher's explicit raw-query style: one `async fn` per operation, `RETURNING id` on
//! inserts, no ORM.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::db::parse_sqlite_datetime;
use super::{ConfigStore, ImageStore, RepositoryStore, TagStore};
use crate::models::{Image, ImageLayer, NewTagMetadata, Repository, Tag, TagMetadata, TagWithMetadata};
use crate::{RegicacheError, RegicacheResult};

/// A `SqlitePool`-backed store implementing all four Persistence Port traits.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wraps an already-migrated `SqlitePool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

//--------------------------------------------------------------------------------------------------
// ConfigStore
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn get(&self, key: &str) -> RegicacheResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM app_config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn update(&self, key: &str, value: &str) -> RegicacheResult<()> {
        sqlx::query(
            "INSERT INTO app_config (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> RegicacheResult<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT key, value FROM app_config")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get("key"), r.get("value")))
            .collect())
    }
}

//--------------------------------------------------------------------------------------------------
// RepositoryStore
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl RepositoryStore for SqliteStore {
    async fn list(
        &self,
        page: u32,
        limit: u32,
        search: Option<&str>,
    ) -> RegicacheResult<Vec<Repository>> {
        let page = page.max(1);
        let offset = (page - 1) * limit;
        let pattern = search.map(|s| format!("%{s}%")).unwrap_or_else(|| "%".to_owned());

        let rows = sqlx::query(
            "SELECT id, name, last_synced, created_at, modified_at FROM repositories
             WHERE name LIKE ? ORDER BY modified_at DESC LIMIT ? OFFSET ?",
        )
        .bind(pattern)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_repository).collect())
    }

    async fn get(&self, name: &str) -> RegicacheResult<Option<Repository>> {
        let row = sqlx::query(
            "SELECT id, name, last_synced, created_at, modified_at FROM repositories WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_repository))
    }

    async fn create(&self, name: &str) -> RegicacheResult<Repository> {
        let row = sqlx::query(
            "INSERT INTO repositories (name) VALUES (?)
             RETURNING id, name, last_synced, created_at, modified_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_repository(row))
    }

    async fn update(&self, repository: &Repository) -> RegicacheResult<()> {
        sqlx::query(
            "UPDATE repositories SET last_synced = ?, modified_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(repository.last_synced.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()))
        .bind(repository.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, name: &str) -> RegicacheResult<()> {
        sqlx::query("DELETE FROM repositories WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn row_to_repository(row: sqlx::sqlite::SqliteRow) -> Repository {
    Repository {
        id: row.get("id"),
        name: row.get("name"),
        last_synced: row
            .get::<Option<String>, _>("last_synced")
            .map(|s| parse_sqlite_datetime(&s)),
        created_at: parse_sqlite_datetime(&row.get::<String, _>("created_at")),
        modified_at: parse_sqlite_datetime(&row.get::<String, _>("modified_at")),
    }
}

//--------------------------------------------------------------------------------------------------
// ImageStore
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ImageStore for SqliteStore {
    async fn list(&self, repo_name: &str) -> RegicacheResult<Vec<Image>> {
        let rows = sqlx::query(
            "SELECT i.id, i.repository_id, i.name, i.full_name, i.created_at, i.modified_at
             FROM images i JOIN repositories r ON r.id = i.repository_id
             WHERE r.name = ? ORDER BY i.name",
        )
        .bind(repo_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_image).collect())
    }

    async fn get(&self, repo_name: &str, image_name: &str) -> RegicacheResult<Option<Image>> {
        let row = sqlx::query(
            "SELECT i.id, i.repository_id, i.name, i.full_name, i.created_at, i.modified_at
             FROM images i JOIN repositories r ON r.id = i.repository_id
             WHERE r.name = ? AND i.name = ?",
        )
        .bind(repo_name)
        .bind(image_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_image))
    }

    async fn create(&self, repository_id: i64, name: &str, full_name: &str) -> RegicacheResult<Image> {
        let row = sqlx::query(
            "INSERT INTO images (repository_id, name, full_name) VALUES (?, ?, ?)
             RETURNING id, repository_id, name, full_name, created_at, modified_at",
        )
        .bind(repository_id)
        .bind(name)
        .bind(full_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_image(row))
    }

    async fn update(&self, image: &Image) -> RegicacheResult<()> {
        sqlx::query("UPDATE images SET full_name = ?, modified_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(&image.full_name)
            .bind(image.id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, repo_name: &str, image_name: &str) -> RegicacheResult<()> {
        sqlx::query(
            "DELETE FROM images WHERE id = (
                 SELECT i.id FROM images i JOIN repositories r ON r.id = i.repository_id
                 WHERE r.name = ? AND i.name = ?
             )",
        )
        .bind(repo_name)
        .bind(image_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_image(row: sqlx::sqlite::SqliteRow) -> Image {
    Image {
        id: row.get("id"),
        repository_id: row.get("repository_id"),
        name: row.get("name"),
        full_name: row.get("full_name"),
        created_at: parse_sqlite_datetime(&row.get::<String, _>("created_at")),
        modified_at: parse_sqlite_datetime(&row.get::<String, _>("modified_at")),
    }
}

//--------------------------------------------------------------------------------------------------
// TagStore
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl TagStore for SqliteStore {
    async fn list(&self, repo_name: &str, image_name: &str) -> RegicacheResult<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT t.id, t.image_id, t.name, t.digest, t.created_at
             FROM tags t
             JOIN images i ON i.id = t.image_id
             JOIN repositories r ON r.id = i.repository_id
             WHERE r.name = ? AND i.name = ? ORDER BY t.name",
        )
        .bind(repo_name)
        .bind(image_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_tag).collect())
    }

    async fn get(
        &self,
        repo_name: &str,
        image_name: &str,
        tag_name: &str,
    ) -> RegicacheResult<Option<TagWithMetadata>> {
        let Some(tag_row) = sqlx::query(
            "SELECT t.id, t.image_id, t.name, t.digest, t.created_at
             FROM tags t
             JOIN images i ON i.id = t.image_id
             JOIN repositories r ON r.id = i.repository_id
             WHERE r.name = ? AND i.name = ? AND t.name = ?",
        )
        .bind(repo_name)
        .bind(image_name)
        .bind(tag_name)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let tag = row_to_tag(tag_row);

        let metadata_row = sqlx::query(
            "SELECT id, tag_id, created, os, architecture, author, work_dir, command,
                    entrypoint, exposed_ports, total_size, docker_file, config_digest,
                    content_digest, index_digest, is_oci, created_at, modified_at
             FROM tag_metadata WHERE tag_id = ?",
        )
        .bind(tag.id)
        .fetch_optional(&self.pool)
        .await?;

        let (metadata, layers) = match metadata_row {
            Some(row) => {
                let metadata = row_to_metadata(row);
                let layer_rows = sqlx::query(
                    "SELECT id, tag_metadata_id, position, size, digest FROM image_layers
                     WHERE tag_metadata_id = ? ORDER BY position ASC",
                )
                .bind(metadata.id)
                .fetch_all(&self.pool)
                .await?;

                (Some(metadata), layer_rows.into_iter().map(row_to_layer).collect())
            }
            None => (None, Vec::new()),
        };

        Ok(Some(TagWithMetadata {
            tag,
            metadata,
            layers,
        }))
    }

    async fn create(
        &self,
        image_id: i64,
        tag_name: &str,
        digest: &str,
        metadata: Option<&NewTagMetadata>,
    ) -> RegicacheResult<Tag> {
        let mut tx = self.pool.begin().await?;

        let tag_row = sqlx::query(
            "INSERT INTO tags (image_id, name, digest) VALUES (?, ?, ?)
             RETURNING id, image_id, name, digest, created_at",
        )
        .bind(image_id)
        .bind(tag_name)
        .bind(digest)
        .fetch_one(&mut *tx)
        .await?;

        let tag = row_to_tag(tag_row);

        if let Some(metadata) = metadata {
            insert_metadata_and_layers(&mut tx, tag.id, metadata).await?;
        }

        tx.commit().await?;
        Ok(tag)
    }

    async fn update(&self, tag: &Tag, metadata: Option<&NewTagMetadata>) -> RegicacheResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE tags SET digest = ? WHERE id = ?")
            .bind(&tag.digest)
            .bind(tag.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM tag_metadata WHERE tag_id = ?")
            .bind(tag.id)
            .execute(&mut *tx)
            .await?;

        if let Some(metadata) = metadata {
            insert_metadata_and_layers(&mut tx, tag.id, metadata).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, repo_name: &str, image_name: &str, tag_name: &str) -> RegicacheResult<()> {
        let mut tx = self.pool.begin().await?;

        let tag_id: Option<i64> = sqlx::query(
            "SELECT t.id FROM tags t
             JOIN images i ON i.id = t.image_id
             JOIN repositories r ON r.id = i.repository_id
             WHERE r.name = ? AND i.name = ? AND t.name = ?",
        )
        .bind(repo_name)
        .bind(image_name)
        .bind(tag_name)
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| r.get("id"));

        let Some(tag_id) = tag_id else {
            return Err(RegicacheError::NotFound(format!(
                "{repo_name}/{image_name}:{tag_name}"
            )));
        };

        sqlx::query("DELETE FROM tag_metadata WHERE tag_id = ?")
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn insert_metadata_and_layers(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    tag_id: i64,
    metadata: &NewTagMetadata,
) -> RegicacheResult<()> {
    let metadata_row = sqlx::query(
        "INSERT INTO tag_metadata
             (tag_id, created, os, architecture, author, work_dir, command, entrypoint,
              exposed_ports, total_size, docker_file, config_digest, content_digest,
              index_digest, is_oci)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(tag_id)
    .bind(&metadata.created)
    .bind(&metadata.os)
    .bind(&metadata.architecture)
    .bind(&metadata.author)
    .bind(&metadata.work_dir)
    .bind(&metadata.command)
    .bind(&metadata.entrypoint)
    .bind(&metadata.exposed_ports)
    .bind(metadata.total_size)
    .bind(&metadata.docker_file)
    .bind(&metadata.config_digest)
    .bind(&metadata.content_digest)
    .bind(&metadata.index_digest)
    .bind(metadata.is_oci)
    .fetch_one(&mut **tx)
    .await?;

    let metadata_id: i64 = metadata_row.get("id");

    for (position, (size, digest)) in metadata.layers.iter().enumerate() {
        sqlx::query(
            "INSERT INTO image_layers (tag_metadata_id, position, size, digest) VALUES (?, ?, ?, ?)",
        )
        .bind(metadata_id)
        .bind(position as i64)
        .bind(size)
        .bind(digest)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

fn row_to_tag(row: sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        image_id: row.get("image_id"),
        name: row.get("name"),
        digest: row.get("digest"),
        created_at: parse_sqlite_datetime(&row.get::<String, _>("created_at")),
    }
}

fn row_to_metadata(row: sqlx::sqlite::SqliteRow) -> TagMetadata {
    TagMetadata {
        id: row.get("id"),
        tag_id: row.get("tag_id"),
        created: row.get("created"),
        os: row.get("os"),
        architecture: row.get("architecture"),
        author: row.get("author"),
        work_dir: row.get("work_dir"),
        command: row.get("command"),
        entrypoint: row.get("entrypoint"),
        exposed_ports: row.get("exposed_ports"),
        total_size: row.get("total_size"),
        docker_file: row.get("docker_file"),
        config_digest: row.get("config_digest"),
        content_digest: row.get("content_digest"),
        index_digest: row.get("index_digest"),
        is_oci: row.get("is_oci"),
        created_at: parse_sqlite_datetime(&row.get::<String, _>("created_at")),
        modified_at: parse_sqlite_datetime(&row.get::<String, _>("modified_at")),
    }
}

fn row_to_layer(row: sqlx::sqlite::SqliteRow) -> ImageLayer {
    ImageLayer {
        id: row.get("id"),
        tag_metadata_id: row.get("tag_metadata_id"),
        position: row.get("position"),
        size: row.get("size"),
        digest: row.get("digest"),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_pool;

    async fn fixture() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_pool(dir.path().join("regicache.db"), "1").await.unwrap();
        (dir, SqliteStore::new(pool))
    }

    #[tokio::test]
    async fn creates_and_reads_repository() {
        let (_dir, store) = fixture().await;
        store.create("library").await.unwrap();
        let found = store.get("library").await.unwrap().unwrap();
        assert_eq!(found.name, "library");
        assert!(found.last_synced.is_none());
    }

    #[tokio::test]
    async fn tag_tree_round_trips_layer_order() {
        let (_dir, store) = fixture().await;
        let repo = RepositoryStore::create(&store, "library").await.unwrap();
        let image = ImageStore::create(&store, repo.id, "alpine", "library/alpine")
            .await
            .unwrap();

        let metadata = NewTagMetadata {
            created: "2024-01-01T00:00:00Z".into(),
            os: "linux".into(),
            architecture: "amd64".into(),
            author: "Unknown".into(),
            work_dir: "/".into(),
            command: "/bin/sh".into(),
            entrypoint: String::new(),
            exposed_ports: String::new(),
            total_size: 100,
            docker_file: "CMD [\"/bin/sh\"]".into(),
            config_digest: "sha256:cfg".into(),
            content_digest: "sha256:content".into(),
            index_digest: String::new(),
            is_oci: true,
            layers: vec![(10, "sha256:l1".into()), (20, "sha256:l2".into())],
        };

        TagStore::create(&store, image.id, "latest", "sha256:cfg", Some(&metadata))
            .await
            .unwrap();

        let fetched = TagStore::get(&store, "library", "alpine", "latest")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(fetched.layers.len(), 2);
        assert_eq!(fetched.layers[0].digest, "sha256:l1");
        assert_eq!(fetched.layers[1].digest, "sha256:l2");
    }

    #[tokio::test]
    async fn delete_missing_tag_is_not_found() {
        let (_dir, store) = fixture().await;
        let err = TagStore::delete(&store, "library", "alpine", "latest")
            .await
            .unwrap_err();
        assert!(matches!(err, RegicacheError::NotFound(_)));
    }
}
