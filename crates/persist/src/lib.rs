//! Hoist persistence: best-effort wizard session snapshots in SQLite.
//! Convenience state only; the proposal itself is never stored here.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bumped whenever the snapshot layout changes; older rows are ignored.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    /// Seconds since epoch.
    pub saved_at: i64,
    pub cluster: String,
    pub step: String,
    /// Cursor position per step name.
    #[serde(default)]
    pub cursors: BTreeMap<String, usize>,
    #[serde(default)]
    pub selected_namespaces: Vec<String>,
}

impl SessionSnapshot {
    pub fn new(cluster: &str, step: &str) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: now_ts(),
            cluster: cluster.to_string(),
            step: step.to_string(),
            cursors: BTreeMap::new(),
            selected_namespaces: Vec::new(),
        }
    }

    /// Usable at `now` given a staleness threshold in seconds.
    pub fn is_fresh(&self, now: i64, ttl_secs: i64) -> bool {
        self.version == SNAPSHOT_VERSION && now.saturating_sub(self.saved_at) <= ttl_secs
    }
}

pub trait SessionStore: Send + Sync {
    fn save(&self, snap: &SessionSnapshot) -> Result<()>;
    /// Latest fresh snapshot for `cluster`; stale or foreign-version rows yield `None`.
    fn load(&self, cluster: &str, now: i64, ttl_secs: i64) -> Result<Option<SessionSnapshot>>;
    fn clear(&self, cluster: &str) -> Result<()>;
}

/// SQLite-backed store. Synchronous; snapshots are tiny.
pub struct SqliteSessionStore {
    db: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteSessionStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("HOIST_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", &"WAL").ok();
        db.pragma_update(None, "synchronous", &"NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS session (
                cluster  TEXT PRIMARY KEY,
                version  INTEGER NOT NULL,
                saved_at INTEGER NOT NULL,
                body     TEXT NOT NULL
            )",
            [],
        )
        .context("creating session table")?;
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(Self { db: std::sync::Mutex::new(db) })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.db.lock().map_err(|_| anyhow!("session db lock poisoned"))
    }
}

impl SessionStore for SqliteSessionStore {
    fn save(&self, snap: &SessionSnapshot) -> Result<()> {
        let started = std::time::Instant::now();
        let body = serde_json::to_string(snap).context("encoding session snapshot")?;
        let db = self.conn()?;
        db.execute(
            "INSERT INTO session(cluster, version, saved_at, body) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(cluster) DO UPDATE SET version = ?2, saved_at = ?3, body = ?4",
            (&snap.cluster, snap.version, snap.saved_at, &body),
        )?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        Ok(())
    }

    fn load(&self, cluster: &str, now: i64, ttl_secs: i64) -> Result<Option<SessionSnapshot>> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT body FROM session WHERE cluster = ?1")?;
        let mut rows = stmt.query([cluster])?;
        let Some(row) = rows.next()? else { return Ok(None) };
        let body: String = row.get(0)?;
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        let snap: SessionSnapshot = match serde_json::from_str(&body) {
            Ok(s) => s,
            Err(e) => {
                debug!(cluster, error = %e, "unreadable session snapshot ignored");
                return Ok(None);
            }
        };
        if !snap.is_fresh(now, ttl_secs) {
            debug!(cluster, saved_at = snap.saved_at, version = snap.version, "stale session snapshot ignored");
            return Ok(None);
        }
        Ok(Some(snap))
    }

    fn clear(&self, cluster: &str) -> Result<()> {
        self.conn()?.execute("DELETE FROM session WHERE cluster = ?1", [cluster])?;
        Ok(())
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".hoist");
        let _ = std::fs::create_dir_all(&p);
        p.push("hoist.db");
        return p.to_string_lossy().to_string();
    }
    "hoist.db".to_string()
}

pub fn now_ts() -> i64 {
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    now.as_secs() as i64
}
