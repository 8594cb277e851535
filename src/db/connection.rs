use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::HeliosError;
use crate::models::finding::Severity;
use crate::models::scan_tree::ScanTree;
use super::sink::ResultSink;

#[derive(Default)]
struct SinkState {
    conn: Option<Connection>,
    run_id: Option<String>,
}

/// SQLite-backed result sink.
pub struct SqliteSink {
    state: Mutex<SinkState>,
}

impl SqliteSink {
    pub fn new() -> Self {
        Self { state: Mutex::new(SinkState::default()) }
    }

    /// Identifier of the run recorded by `record_run_start`, kept after close.
    pub fn run_id(&self) -> Option<String> {
        self.lock().ok().and_then(|s| s.run_id.clone())
    }

    pub fn is_open(&self) -> bool {
        self.lock().map(|s| s.conn.is_some()).unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SinkState>, HeliosError> {
        self.state
            .lock()
            .map_err(|_| HeliosError::Database("Result sink lock poisoned".into()))
    }
}

impl Default for SqliteSink {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn open_connection(path: &Path) -> Result<Connection, HeliosError> {
    if path.as_os_str() == ":memory:" {
        let conn = Connection::open_in_memory()
            .map_err(|e| HeliosError::Database(format!("Failed to open in-memory db: {}", e)))?;
        conn.execute_batch(super::schema::CREATE_TABLES)
            .map_err(|e| HeliosError::Database(format!("Failed to create tables: {}", e)))?;
        return Ok(conn);
    }

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)
        .map_err(|e| HeliosError::Database(format!("Failed to open database: {}", e)))?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .map_err(|e| HeliosError::Database(format!("Failed to set pragmas: {}", e)))?;
    conn.execute_batch(super::schema::CREATE_TABLES)
        .map_err(|e| HeliosError::Database(format!("Failed to create tables: {}", e)))?;
    Ok(conn)
}

fn require_run<'a>(state: &'a SinkState) -> Result<(&'a Connection, &'a str), HeliosError> {
    let conn = state
        .conn
        .as_ref()
        .ok_or_else(|| HeliosError::Database("Result sink is not open".into()))?;
    let run_id = state
        .run_id
        .as_deref()
        .ok_or_else(|| HeliosError::Database("No run recorded on result sink".into()))?;
    Ok((conn, run_id))
}

impl ResultSink for SqliteSink {
    fn open(&self, path: &Path) -> Result<(), HeliosError> {
        let mut state = self.lock()?;
        if state.conn.is_some() {
            return Err(HeliosError::Database("Result sink already open".into()));
        }
        state.conn = Some(open_connection(path)?);
        state.run_id = None;
        info!(path = %path.display(), "Using SQLite database");
        Ok(())
    }

    fn record_run_start(&self, seed_url: &str, scope_host: &str) -> Result<(), HeliosError> {
        let mut state = self.lock()?;
        let conn = state
            .conn
            .as_ref()
            .ok_or_else(|| HeliosError::Database("Result sink is not open".into()))?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO runs (id, seed_url, scope_host, started_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, seed_url, scope_host, Utc::now().to_rfc3339()],
        ).map_err(|e| HeliosError::Database(format!("Failed to record run: {}", e)))?;
        debug!(run_id = %id, seed_url, scope_host, "Recorded run start");
        state.run_id = Some(id);
        Ok(())
    }

    fn put(&self, result_type: &str, script: &str, severity: Severity, text: &str) -> Result<(), HeliosError> {
        let state = self.lock()?;
        let (conn, run_id) = require_run(&state)?;
        conn.execute(
            "INSERT INTO results (id, run_id, result_type, script, severity, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                uuid::Uuid::new_v4().to_string(),
                run_id,
                result_type,
                script,
                severity.level(),
                text,
                Utc::now().to_rfc3339(),
            ],
        ).map_err(|e| HeliosError::Database(format!("Failed to insert result: {}", e)))?;
        Ok(())
    }

    fn record_report(&self, report: &ScanTree) -> Result<(), HeliosError> {
        let state = self.lock()?;
        let (conn, run_id) = require_run(&state)?;
        let json = serde_json::to_string(report)?;
        conn.execute(
            "UPDATE runs SET report_json = ?2 WHERE id = ?1",
            rusqlite::params![run_id, json],
        ).map_err(|e| HeliosError::Database(format!("Failed to store report: {}", e)))?;
        Ok(())
    }

    fn close(&self) -> Result<(), HeliosError> {
        let mut state = self.lock()?;
        let Some(conn) = state.conn.take() else {
            return Ok(());
        };
        if let Some(run_id) = state.run_id.as_deref() {
            conn.execute(
                "UPDATE runs SET ended_at = ?2 WHERE id = ?1",
                rusqlite::params![run_id, Utc::now().to_rfc3339()],
            ).map_err(|e| HeliosError::Database(format!("Failed to finalize run: {}", e)))?;
        }
        conn.close()
            .map_err(|(_, e)| HeliosError::Database(format!("Failed to close database: {}", e)))?;
        debug!("Result sink closed");
        Ok(())
    }
}
