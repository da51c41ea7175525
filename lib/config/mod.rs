//! Ambient configuration loading (A2): CLI flags with env-var fallback, loaded once at
//! startup. The core itself never reads environment variables directly (spec.md 6) — only
//! this module, invoked from `bin/main.rs`, does.

use clap::Parser;

/// Startup configuration for `regicached`.
#[derive(Debug, Clone, Parser)]
#[command(name = "regicached", version, about = "Registry metadata cache and reconciliation daemon")]
pub struct RegicacheConfig {
    /// Base URL of the upstream Distribution v2 registry.
    #[arg(long, env = "REGICACHE_REGISTRY_URL")]
    pub registry_url: String,

    /// HTTP Basic auth username. Auth is only attached when both username and password
    /// are non-empty.
    #[arg(long, env = "REGICACHE_REGISTRY_USERNAME", default_value = "")]
    pub registry_username: String,

    /// HTTP Basic auth password.
    #[arg(long, env = "REGICACHE_REGISTRY_PASSWORD", default_value = "")]
    pub registry_password: String,

    /// Default sync interval in minutes, used only on a fresh database. Must be one of
    /// 5, 15, 30, 60.
    #[arg(long, env = "REGICACHE_SYNC_INTERVAL", default_value_t = 5)]
    pub default_sync_interval: u64,

    /// Path to the SQLite database file.
    #[arg(long, env = "REGICACHE_DB_PATH", default_value = "regicache.db")]
    pub db_path: String,

    /// Address the HTTP server binds to.
    #[arg(long, env = "REGICACHE_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// The schema version expected by this build; a stored `db_version` mismatch causes
    /// the database file to be rotated aside (spec.md 3/6).
    #[arg(long, env = "REGICACHE_DB_VERSION", default_value = "1")]
    pub db_version: String,
}

impl RegicacheConfig {
    /// Loads a `.env` file (if present) via `dotenvy`, then parses CLI args with env
    /// fallback.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }
}
