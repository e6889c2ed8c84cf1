//! Application state and configuration.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:3000").
    pub bind_addr: String,

    /// Path to the index SQLite database written by the ingester.
    pub db_path: PathBuf,

    /// DID this feed generator serves as (e.g., "did:web:feeds.example.com").
    pub service_did: String,

    /// Public hostname of this service.
    pub hostname: String,

    /// DID of the account publishing the feed generator records.
    pub publisher_did: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `PORCHLIGHT_HOSTNAME`: Public hostname of this service
    /// - `PORCHLIGHT_PUBLISHER_DID`: DID publishing the feed records
    ///
    /// Optional environment variables:
    /// - `PORCHLIGHT_BIND_ADDR`: Server bind address (default: "0.0.0.0:3000")
    /// - `PORCHLIGHT_DB_PATH`: Index database path (default: "./data/porchlight.db")
    /// - `PORCHLIGHT_SERVICE_DID`: Service DID (default: "did:web:{hostname}")
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr =
            std::env::var("PORCHLIGHT_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let db_path = std::env::var("PORCHLIGHT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/porchlight.db"));

        let hostname = std::env::var("PORCHLIGHT_HOSTNAME")
            .map_err(|_| anyhow::anyhow!("PORCHLIGHT_HOSTNAME environment variable is required"))?;

        let publisher_did = std::env::var("PORCHLIGHT_PUBLISHER_DID").map_err(|_| {
            anyhow::anyhow!("PORCHLIGHT_PUBLISHER_DID environment variable is required")
        })?;

        let service_did = std::env::var("PORCHLIGHT_SERVICE_DID")
            .unwrap_or_else(|_| format!("did:web:{}", hostname));

        tracing::info!(
            bind_addr = %bind_addr,
            db_path = %db_path.display(),
            service_did = %service_did,
            "configuration loaded"
        );

        Ok(Self {
            bind_addr,
            db_path,
            service_did,
            hostname,
            publisher_did,
        })
    }
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,

    /// Read-only SQLite connection to the index database.
    pub db: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create application state, opening the index database read-only.
    ///
    /// The ingester writes the database in WAL mode, so a plain read-only
    /// connection sees consistent snapshots without blocking the writer.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let conn = Connection::open_with_flags(
            &config.db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            anyhow::anyhow!(
                "failed to open index database {}: {}",
                config.db_path.display(),
                e
            )
        })?;

        tracing::info!("Index database connected: {}", config.db_path.display());

        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create application state over an existing connection (for testing).
    pub fn with_connection(config: Config, conn: Connection) -> Self {
        Self {
            config: Arc::new(config),
            db: Arc::new(Mutex::new(conn)),
        }
    }
}
