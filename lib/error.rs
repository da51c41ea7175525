use std::fmt::{self, Display};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a regicache operation.
pub type RegicacheResult<T> = Result<T, RegicacheError>;

/// An error that occurred somewhere in the reconciliation engine, the tag-deletion
/// pipeline, the scheduler, or their supporting ports.
#[derive(pretty_error_debug::Debug, Error)]
pub enum RegicacheError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error, used at module boundaries that don't
    /// warrant a dedicated variant.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred while issuing an HTTP request to the registry.
    #[error("registry http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred in the retry/backoff middleware layer.
    #[error("registry http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// A non-2xx, non-404 response from the registry.
    #[error("registry responded with status {status}: {body}")]
    RegistryHttp {
        /// The HTTP status code returned.
        status: u16,
        /// The response body, if any was read.
        body: String,
    },

    /// The registry could not be reached at all (DNS, connect, TLS, timeout).
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// A manifest index contained no manifest usable as a sync target.
    #[error("no valid manifest found in index for {0}:{1}")]
    NoValidManifest(String, String),

    /// A `PerformSync` call was rejected because one was already in flight.
    #[error("a sync is already in progress")]
    SyncBusy,

    /// `UpdateSyncInterval` was called with a value outside {5, 15, 30, 60}.
    #[error("invalid sync interval: {0} (must be one of 5, 15, 30, 60)")]
    InvalidInterval(u64),

    /// A requested repository, image, or tag does not exist locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// An error that occurred during a database operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An error that occurred while running database migrations.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An error that occurred decoding or encoding JSON.
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// An error from the registry's error-shaped JSON response body.
    #[error("registry error response: {0}")]
    RegistryErrorResponse(String),

    /// An invalid registry repository path was encountered (e.g. empty).
    #[error("invalid repository path: {0}")]
    InvalidRepositoryPath(String),

    /// A configuration value failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RegicacheError {
    /// Wraps an arbitrary error into a `RegicacheError`.
    pub fn custom(error: impl Into<anyhow::Error>) -> RegicacheError {
        RegicacheError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// True if this error represents a registry 404 response.
    pub fn is_registry_not_found(&self) -> bool {
        matches!(self, RegicacheError::RegistryHttp { status, .. } if *status == 404)
    }
}

impl AnyError {
    /// Downcasts the wrapped error to `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for AnyError {}
