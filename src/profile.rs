//! Comfort-kit profile persistence.
//! The store is an opaque key → blob map; the core serializes
//! `ComfortKitConfig` as JSON under a fixed key, reads it at session start
//! and writes it on explicit save.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::dispatch::ComfortKitConfig;

/// Fixed key the comfort kit is stored under.
pub const PROFILE_KEY: &str = "comfortKit";

#[derive(Debug)]
pub enum ProfileError {
    Storage(String),
    Serde(serde_json::Error),
}

impl std::fmt::Display for ProfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileError::Storage(msg) => write!(f, "profile storage error: {msg}"),
            ProfileError::Serde(e) => write!(f, "profile blob error: {e}"),
        }
    }
}

impl std::error::Error for ProfileError {}

impl From<rusqlite::Error> for ProfileError {
    fn from(e: rusqlite::Error) -> Self {
        ProfileError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ProfileError {
    fn from(e: serde_json::Error) -> Self {
        ProfileError::Serde(e)
    }
}

/// Opaque get/set blob store (platform adapter).
pub trait ProfileStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ProfileError>;
    fn set(&self, key: &str, blob: &str) -> Result<(), ProfileError>;
}

/// Read the saved comfort kit. A missing or unreadable blob yields None;
/// the caller starts with an empty kit.
pub fn load_profile(store: &dyn ProfileStore) -> Option<ComfortKitConfig> {
    let blob = match store.get(PROFILE_KEY) {
        Ok(Some(blob)) => blob,
        Ok(None) => {
            debug!("no saved comfort kit");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "comfort kit load failed");
            return None;
        }
    };
    match serde_json::from_str::<ComfortKitConfig>(&blob) {
        Ok(kit) => Some(kit),
        Err(e) => {
            warn!(error = %e, "saved comfort kit unreadable, ignored");
            None
        }
    }
}

/// Persist the comfort kit under `PROFILE_KEY`.
pub fn save_profile(store: &dyn ProfileStore, kit: &ComfortKitConfig) -> Result<(), ProfileError> {
    let blob = serde_json::to_string(kit)?;
    store.set(PROFILE_KEY, &blob)?;
    info!("comfort kit saved");
    Ok(())
}

/// SQLite-backed profile store.
pub struct SqliteProfileStore {
    conn: Mutex<Connection>,
}

impl SqliteProfileStore {
    /// Open (or create) the profile database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, ProfileError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::init(conn)?;
        info!(path = %db_path.display(), "profile store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, ProfileError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, ProfileError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS profiles (
                profile_key TEXT PRIMARY KEY,
                blob TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ProfileStore for SqliteProfileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ProfileError> {
        let conn = self.conn.lock();
        let blob: Option<String> = conn
            .query_row(
                "SELECT blob FROM profiles WHERE profile_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob)
    }

    fn set(&self, key: &str, blob: &str) -> Result<(), ProfileError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO profiles (profile_key, blob, updated_at)
             VALUES (?1, ?2, ?3)",
            params![key, blob, now_unix()],
        )?;
        Ok(())
    }
}

/// In-memory store for tests and hosts without persistence.
#[derive(Default)]
pub struct MemoryProfileStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ProfileError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, blob: &str) -> Result<(), ProfileError> {
        self.entries.lock().insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// Current time as Unix timestamp (seconds).
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
