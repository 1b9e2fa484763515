//! World state storage backends
//!
//! Sinks are fallible; the [`WorldStateLogger`](super::WorldStateLogger)
//! disables its sink after the first failure and keeps the session running.

use bevy::log::{info, warn};
use rusqlite::{Connection, params};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::record::WorldStateRecord;
use crate::config::WorldStateSinkConfig;
use crate::error::SinkError;

/// Destination for world state records
pub trait WorldStateSink: Send + Sync {
    fn write(&mut self, record: &WorldStateRecord) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Short name for log lines
    fn describe(&self) -> String;
}

/// Keeps records in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<WorldStateRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<WorldStateRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorldStateSink for MemorySink {
    fn write(&mut self, record: &WorldStateRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .map_err(|_| SinkError::Transport("memory sink lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// One JSON document per line
pub struct JsonLinesSink {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        info!("World state logging to {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }
}

impl WorldStateSink for JsonLinesSink {
    fn write(&mut self, record: &WorldStateRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json lines ({})", self.path.display())
    }
}

/// SQLite store: one row per record plus one row per entity pose
pub struct SqliteSink {
    conn: Mutex<Connection>,
    episode_id: String,
}

impl SqliteSink {
    pub fn open(path: &Path, episode_id: &str) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::with_connection(conn, episode_id)
    }

    pub fn in_memory(episode_id: &str) -> Result<Self, SinkError> {
        Self::with_connection(Connection::open_in_memory()?, episode_id)
    }

    fn with_connection(conn: Connection, episode_id: &str) -> Result<Self, SinkError> {
        init_schema(&conn)?;
        conn.execute(
            "INSERT OR REPLACE INTO episodes (id, created_at) VALUES (?1, ?2)",
            params![episode_id, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            episode_id: episode_id.to_string(),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SinkError> {
        self.conn
            .lock()
            .map_err(|_| SinkError::Transport("sqlite connection lock poisoned".to_string()))
    }

    /// Stored records for this episode
    pub fn record_count(&self) -> Result<u64, SinkError> {
        let conn = self.lock()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM world_states WHERE episode_id = ?1",
            params![self.episode_id],
            |row| row.get(0),
        )?)
    }

    /// How many records contain `entity_id`
    pub fn entity_count(&self, entity_id: &str) -> Result<u64, SinkError> {
        let conn = self.lock()?;
        Ok(conn.query_row(
            r#"SELECT COUNT(*) FROM entity_poses p
               JOIN world_states s ON s.id = p.state_id
               WHERE s.episode_id = ?1 AND p.entity_id = ?2"#,
            params![self.episode_id, entity_id],
            |row| row.get(0),
        )?)
    }
}

impl WorldStateSink for SqliteSink {
    fn write(&mut self, record: &WorldStateRecord) -> Result<(), SinkError> {
        let data = serde_json::to_string(record)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO world_states (episode_id, timestamp, data) VALUES (?1, ?2, ?3)",
            params![self.episode_id, record.timestamp.secs(), data],
        )?;
        let state_id = tx.last_insert_rowid();
        for entity in &record.entities {
            let (loc, rot) = (entity.pose.loc, entity.pose.rot);
            tx.execute(
                r#"INSERT INTO entity_poses
                   (state_id, entity_id, class, x, y, z, qx, qy, qz, qw, bone_count)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
                params![
                    state_id,
                    entity.id,
                    entity.class,
                    loc.x,
                    loc.y,
                    loc.z,
                    rot.x,
                    rot.y,
                    rot.z,
                    rot.w,
                    entity.bones.len() as i64,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite (episode {})", self.episode_id)
    }
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS episodes (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS world_states (
            id INTEGER PRIMARY KEY,
            episode_id TEXT REFERENCES episodes(id),
            timestamp REAL NOT NULL,
            data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entity_poses (
            id INTEGER PRIMARY KEY,
            state_id INTEGER REFERENCES world_states(id),
            entity_id TEXT NOT NULL,
            class TEXT NOT NULL,
            x REAL NOT NULL,
            y REAL NOT NULL,
            z REAL NOT NULL,
            qx REAL NOT NULL,
            qy REAL NOT NULL,
            qz REAL NOT NULL,
            qw REAL NOT NULL,
            bone_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_world_states_episode ON world_states(episode_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_entity_poses_entity ON entity_poses(entity_id);
        "#,
    )?;
    Ok(())
}

/// Build the sink named by the config
pub fn open_sink(
    config: &WorldStateSinkConfig,
    episode_id: &str,
) -> Result<Box<dyn WorldStateSink>, SinkError> {
    match config {
        WorldStateSinkConfig::Memory => Ok(Box::new(MemorySink::new())),
        WorldStateSinkConfig::JsonLines { path } => Ok(Box::new(JsonLinesSink::create(path)?)),
        WorldStateSinkConfig::Sqlite { path } => {
            let sink = SqliteSink::open(path, episode_id).inspect_err(|e| {
                warn!("Failed to open world state database {}: {}", path.display(), e);
            })?;
            Ok(Box::new(sink))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Timestamp;
    use crate::world_state::record::{EntityRecord, PoseRecord};
    use bevy::math::{Quat, Vec3};

    fn record(t: f64, ids: &[&str]) -> WorldStateRecord {
        WorldStateRecord {
            timestamp: Timestamp(t),
            entities: ids
                .iter()
                .map(|id| EntityRecord {
                    id: id.to_string(),
                    class: "Thing".to_string(),
                    pose: PoseRecord::new(Vec3::ONE, Quat::IDENTITY),
                    bones: Vec::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_sqlite_sink_stores_records() {
        let mut sink = SqliteSink::in_memory("ep_test").unwrap();
        sink.write(&record(0.0, &["Cup", "Bowl"])).unwrap();
        sink.write(&record(0.5, &["Cup"])).unwrap();
        assert_eq!(sink.record_count().unwrap(), 2);
        assert_eq!(sink.entity_count("Cup").unwrap(), 2);
        assert_eq!(sink.entity_count("Bowl").unwrap(), 1);
    }

    #[test]
    fn test_json_lines_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ws").join("ep.jsonl");
        let mut sink = JsonLinesSink::create(&path).unwrap();
        sink.write(&record(0.0, &["Cup"])).unwrap();
        sink.write(&record(1.0, &["Bowl"])).unwrap();
        sink.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: WorldStateRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.entities[0].id, "Bowl");
    }

    #[test]
    fn test_memory_sink_shared_between_clones() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.write(&record(0.0, &["Cup"])).unwrap();
        assert_eq!(sink.len(), 1);
    }
}
