//! Shared state injected into every handler.

use std::sync::Arc;

use crate::deleter::TagDeleter;
use crate::persistence::{ImageStore, RepositoryStore, TagStore};
use crate::scheduler::Scheduler;

/// State shared across all Axum handlers.
#[derive(Clone)]
pub struct ServerState {
    /// The periodic sync driver, also the entry point for manual `POST /sync`.
    pub scheduler: Arc<Scheduler>,
    /// The tag-deletion pipeline.
    pub deleter: Arc<TagDeleter>,
    /// Read-only repository listing.
    pub repositories: Arc<dyn RepositoryStore>,
    /// Read-only image listing.
    pub images: Arc<dyn ImageStore>,
    /// Read-only tag listing.
    pub tags: Arc<dyn TagStore>,
}
