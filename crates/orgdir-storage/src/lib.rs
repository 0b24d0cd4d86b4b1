//! Orgdir directory storage
//!
//! Owns the loaded [`DirectoryDb`] and hands out read-only [`Session`]s:
//!
//! ```text
//!   seed.json ──┐
//!               ├──► DirectoryStorage ──► Session (Arc<DirectoryDb>) ──► query engine
//!   data.orgd ──┘         │
//!                         └──► save_snapshot (temp file, then rename)
//! ```
//!
//! A session pins the database it was opened against. `reload` swaps in a
//! freshly loaded database for new sessions only; sessions already handed out
//! keep reading the old one until they are dropped.


use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use orgdir_core::DirectoryError;
use orgdir_store::{DirectoryDb, DirectoryStats, SeedDocument};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Snapshot (`.orgd`) or seed document (`.json`) to load.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./orgdir.orgd"),
        }
    }
}

/// On-disk formats understood by [`load_directory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbFormat {
    Snapshot,
    Seed,
}

impl DbFormat {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("orgd") => Ok(Self::Snapshot),
            Some("json") => Ok(Self::Seed),
            _ => bail!(
                "unsupported directory file `{}` (expected .orgd or .json)",
                path.display()
            ),
        }
    }
}

/// Read a directory from `path`, choosing the format by extension.
pub fn load_directory(path: &Path) -> anyhow::Result<DirectoryDb> {
    match DbFormat::from_path(path)? {
        DbFormat::Snapshot => {
            let bytes =
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            DirectoryDb::from_bytes(&bytes)
                .with_context(|| format!("decoding snapshot {}", path.display()))
        }
        DbFormat::Seed => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let doc = SeedDocument::from_json(&text)?;
            DirectoryDb::from_seed(&doc)
                .with_context(|| format!("loading seed {}", path.display()))
        }
    }
}

/// Write `db` as a snapshot at `path`.
///
/// The bytes go to a sibling temp file first and are renamed into place, so
/// readers never observe a half-written snapshot.
pub fn write_snapshot(db: &DirectoryDb, path: &Path) -> anyhow::Result<()> {
    let bytes = db.to_bytes()?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, &bytes).with_context(|| format!("writing {}", tmp.display()))?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err).with_context(|| format!("renaming into {}", path.display()));
    }
    info!(path = %path.display(), bytes = bytes.len(), "wrote snapshot");
    Ok(())
}

// ============================================================================
// Storage
// ============================================================================

struct Loaded {
    db: Arc<DirectoryDb>,
    loaded_at: DateTime<Utc>,
}

impl Loaded {
    fn new(db: DirectoryDb) -> Self {
        Self {
            db: Arc::new(db),
            loaded_at: Utc::now(),
        }
    }
}

pub struct DirectoryStorage {
    config: StorageConfig,
    state: RwLock<Option<Loaded>>,
}

impl DirectoryStorage {
    /// Load the directory named by `config`.
    pub fn open(config: StorageConfig) -> anyhow::Result<Self> {
        let db = load_directory(&config.db_path)?;
        let stats = db.stats();
        info!(
            path = %config.db_path.display(),
            buildings = stats.buildings,
            activities = stats.activities,
            organizations = stats.organizations,
            "directory loaded"
        );
        if db.is_empty() {
            warn!(path = %config.db_path.display(), "directory is empty");
        }
        Ok(Self::from_db(config, db))
    }

    /// Wrap an already built database. `config.db_path` is only used by
    /// [`DirectoryStorage::reload`].
    pub fn from_db(config: StorageConfig, db: DirectoryDb) -> Self {
        Self {
            config,
            state: RwLock::new(Some(Loaded::new(db))),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// A read-only view of the current database.
    ///
    /// Fails with `StoreUnavailable` once the storage has been closed.
    pub fn session(&self) -> Result<Session, DirectoryError> {
        let state = self.state.read();
        let loaded = state
            .as_ref()
            .ok_or_else(|| DirectoryError::StoreUnavailable("directory is closed".to_string()))?;
        Ok(Session {
            db: Arc::clone(&loaded.db),
        })
    }

    /// Re-read `config.db_path` and publish it to new sessions.
    ///
    /// On failure the previously loaded database stays in place.
    pub fn reload(&self) -> anyhow::Result<DirectoryStats> {
        let db = load_directory(&self.config.db_path)?;
        let stats = db.stats();
        *self.state.write() = Some(Loaded::new(db));
        info!(path = %self.config.db_path.display(), ?stats, "directory reloaded");
        Ok(stats)
    }

    /// Stop handing out sessions. Open sessions stay valid.
    pub fn close(&self) {
        if self.state.write().take().is_some() {
            info!(path = %self.config.db_path.display(), "directory closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.read().is_some()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().as_ref().map(|l| l.loaded_at)
    }

    pub fn stats(&self) -> Option<DirectoryStats> {
        self.state.read().as_ref().map(|l| l.db.stats())
    }

    /// Persist the current database as a snapshot at `path`.
    pub fn save_snapshot(&self, path: &Path) -> anyhow::Result<()> {
        let session = self.session()?;
        write_snapshot(&session, path)
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// A request-scoped handle on one loaded database.
#[derive(Clone)]
pub struct Session {
    db: Arc<DirectoryDb>,
}

impl Deref for Session {
    type Target = DirectoryDb;

    fn deref(&self) -> &DirectoryDb {
        &self.db
    }
}
