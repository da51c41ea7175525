//! `regicache` is a read-mostly metadata cache and management facade in front of an
//! OCI/Docker Distribution v2 container registry.
//!
//! # Overview
//!
//! regicache periodically harvests a registry's namespace -> repository -> tag ->
//! manifest -> image-config graph, normalizes it into a local relational store, and
//! exposes the graph for browsing plus a destructive tag-deletion operation. It handles:
//! - Registry traversal and manifest-index descent
//! - Image config decoding and normalization
//! - Incremental diffing against persisted state
//! - Digest-negotiated tag deletion
//!
//! # Key Features
//!
//! - **Single-flight sync**: at most one reconciliation pass runs at a time
//! - **Multi-arch aware**: descends OCI image indexes / Docker manifest lists
//! - **Failure tolerant**: a single bad repository or tag never aborts a sync
//! - **Simple API**: a small REST surface for triggering syncs and deleting tags
//!
//! # Architecture
//!
//! - **registry**: the typed Distribution v2 HTTP client (catalog, tags, manifests, blobs)
//! - **normalize**: manifest + config -> normalized tag metadata
//! - **digest**: canonicalization and digest selection for deletes
//! - **persistence**: the narrow storage port the core depends on
//! - **reconciler**: the sync engine (C5)
//! - **deleter**: the tag-deletion pipeline (C6)
//! - **scheduler**: the periodic sync driver (C7)
//! - **server**: the HTTP surface exposing the core's contract
//!
//! # Platform Support
//!
//! Linux, macOS. No platform-specific code paths; the crate only makes outbound HTTP
//! calls and talks to a local SQLite file.

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod config;
pub mod deleter;
pub mod digest;
pub mod models;
pub mod normalize;
pub mod persistence;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod utils;

pub use error::*;
