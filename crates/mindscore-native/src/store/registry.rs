//! Registry of trained models per identity
//!
//! Records which artifact was trained for which identity and kind, and
//! answers "latest model" by creation time, falling back to insertion order
//! for equal timestamps.

use std::path::Path;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

use mindscore_core::protocol::ModelReference;
use mindscore_core::types::ModelInfo;

use super::error::{StoreError, StoreResult};
use crate::ml::model::ModelKind;

/// A trained model as recorded in the registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisteredModel {
    /// Identity the model was trained for
    pub info: ModelInfo,
    /// Model kind
    pub kind: ModelKind,
    /// Unique model name
    pub model_name: String,
    /// Artifact location and checksum
    pub reference: ModelReference,
    /// Training time
    pub created_at: DateTime<Utc>,
}

/// Storage of [`RegisteredModel`] records.
pub trait ModelRegistry: Send + Sync {
    /// Append a record
    fn record(&self, model: &RegisteredModel) -> StoreResult<()>;

    /// Most recent record for an identity and kind
    fn latest(&self, info: &ModelInfo, kind: ModelKind) -> StoreResult<Option<RegisteredModel>>;

    /// Every record for an identity, oldest first
    fn list(&self, info: &ModelInfo) -> StoreResult<Vec<RegisteredModel>>;
}

// ============================================================================
// SQLite Registry
// ============================================================================

/// Schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// Registry kept in a SQLite database.
pub struct SqliteModelRegistry {
    conn: Mutex<Connection>,
}

impl SqliteModelRegistry {
    /// Open or create a registry at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let registry = Self { conn: Mutex::new(conn) };
        registry.initialize_schema()?;
        Ok(registry)
    }

    /// Open an in-memory registry (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let registry = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        registry.initialize_schema()?;
        Ok(registry)
    }

    fn initialize_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;

        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            conn.execute_batch(
                r"
                CREATE TABLE IF NOT EXISTS models (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    org_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    project_name TEXT NOT NULL,
                    name TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    model_name TEXT NOT NULL,
                    model_path TEXT NOT NULL,
                    -- RFC 3339 with fixed nanosecond precision, so text order is time order
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_models_identity
                    ON models(org_id, user_id, project_name, name, kind);
                ",
            )?;
            conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])?;
        }

        Ok(())
    }

    fn row_to_model(info: &ModelInfo, row: &rusqlite::Row<'_>) -> rusqlite::Result<RegisteredModel> {
        let kind: String = row.get(0)?;
        let model_name: String = row.get(1)?;
        let model_path: String = row.get(2)?;
        let created_at: String = row.get(3)?;

        let conversion = |idx: usize, e: Box<dyn std::error::Error + Send + Sync>| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
        };

        Ok(RegisteredModel {
            info: info.clone(),
            kind: kind.parse().map_err(|e| conversion(0, Box::new(e)))?,
            model_name,
            reference: model_path.parse().map_err(|e| conversion(2, Box::new(e)))?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| conversion(3, Box::new(e)))?
                .with_timezone(&Utc),
        })
    }
}

impl ModelRegistry for SqliteModelRegistry {
    fn record(&self, model: &RegisteredModel) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        conn.execute(
            "INSERT INTO models (org_id, user_id, project_name, name, kind, model_name, model_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                model.info.org_id,
                model.info.user_id,
                model.info.project_name,
                model.info.name,
                model.kind.name(),
                model.model_name,
                model.reference.to_string(),
                model.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        )?;

        debug!(model_name = %model.model_name, kind = %model.kind, "Model registered");
        Ok(())
    }

    fn latest(&self, info: &ModelInfo, kind: ModelKind) -> StoreResult<Option<RegisteredModel>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        let latest = conn
            .query_row(
                "SELECT kind, model_name, model_path, created_at FROM models
                 WHERE org_id = ?1 AND user_id = ?2 AND project_name = ?3 AND name = ?4 AND kind = ?5
                 ORDER BY created_at DESC, seq DESC
                 LIMIT 1",
                params![info.org_id, info.user_id, info.project_name, info.name, kind.name()],
                |row| Self::row_to_model(info, row),
            )
            .optional()?;
        Ok(latest)
    }

    fn list(&self, info: &ModelInfo) -> StoreResult<Vec<RegisteredModel>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        let mut stmt = conn.prepare(
            "SELECT kind, model_name, model_path, created_at FROM models
             WHERE org_id = ?1 AND user_id = ?2 AND project_name = ?3 AND name = ?4
             ORDER BY created_at ASC, seq ASC",
        )?;

        let rows = stmt.query_map(
            params![info.org_id, info.user_id, info.project_name, info.name],
            |row| Self::row_to_model(info, row),
        )?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ============================================================================
// In-Memory Registry
// ============================================================================

/// Registry held in process memory.
#[derive(Debug, Default)]
pub struct MemoryModelRegistry {
    records: RwLock<Vec<RegisteredModel>>,
}

impl MemoryModelRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelRegistry for MemoryModelRegistry {
    fn record(&self, model: &RegisteredModel) -> StoreResult<()> {
        self.records.write().map_err(|_| StoreError::Locked)?.push(model.clone());
        Ok(())
    }

    fn latest(&self, info: &ModelInfo, kind: ModelKind) -> StoreResult<Option<RegisteredModel>> {
        let records = self.records.read().map_err(|_| StoreError::Locked)?;
        // Later insertions win ties because max_by_key keeps the last maximum
        Ok(records
            .iter()
            .filter(|r| &r.info == info && r.kind == kind)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    fn list(&self, info: &ModelInfo) -> StoreResult<Vec<RegisteredModel>> {
        let records = self.records.read().map_err(|_| StoreError::Locked)?;
        let mut matching: Vec<_> = records.iter().filter(|r| &r.info == info).cloned().collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const CHECKSUM: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn info() -> ModelInfo {
        ModelInfo::new("session", "org", "user", "focus")
    }

    fn registered(name: &str, kind: ModelKind, created_at: DateTime<Utc>) -> RegisteredModel {
        RegisteredModel {
            info: info(),
            kind,
            model_name: name.to_string(),
            reference: ModelReference::new(format!("/models/{name}.model"), CHECKSUM).unwrap(),
            created_at,
        }
    }

    fn exercise(registry: &dyn ModelRegistry) {
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        assert!(registry.latest(&info(), ModelKind::Attention).unwrap().is_none());

        // Recorded out of order: latest is by timestamp, not insertion
        registry.record(&registered("new", ModelKind::Attention, t0 + Duration::seconds(10))).unwrap();
        registry.record(&registered("old", ModelKind::Attention, t0)).unwrap();
        registry.record(&registered("mem", ModelKind::Memory, t0 + Duration::seconds(20))).unwrap();

        let latest = registry.latest(&info(), ModelKind::Attention).unwrap().unwrap();
        assert_eq!(latest.model_name, "new");
        assert_eq!(latest.reference.checksum(), CHECKSUM);

        // Same timestamp: the later insertion wins
        registry.record(&registered("tie", ModelKind::Attention, t0 + Duration::seconds(10))).unwrap();
        let latest = registry.latest(&info(), ModelKind::Attention).unwrap().unwrap();
        assert_eq!(latest.model_name, "tie");

        let other = ModelInfo::new("session", "org", "someone-else", "focus");
        assert!(registry.latest(&other, ModelKind::Attention).unwrap().is_none());

        let all = registry.list(&info()).unwrap();
        let names: Vec<_> = all.iter().map(|r| r.model_name.as_str()).collect();
        assert_eq!(names, ["old", "new", "tie", "mem"]);
    }

    #[test]
    fn test_sqlite_registry() {
        exercise(&SqliteModelRegistry::open_in_memory().unwrap());
    }

    #[test]
    fn test_memory_registry() {
        exercise(&MemoryModelRegistry::new());
    }

    #[test]
    fn test_sqlite_registry_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.sqlite3");
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        SqliteModelRegistry::open(&path)
            .unwrap()
            .record(&registered("kept", ModelKind::Memory, t0))
            .unwrap();

        let reopened = SqliteModelRegistry::open(&path).unwrap();
        let latest = reopened.latest(&info(), ModelKind::Memory).unwrap().unwrap();
        assert_eq!(latest.model_name, "kept");
        assert_eq!(latest.created_at, t0);
    }
}
