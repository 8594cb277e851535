use std::path::Path;

use serde::Serialize;

use crate::errors::HeliosError;
use crate::models::finding::Severity;
use crate::models::scan_tree::ScanTree;
use super::connection::open_connection;

#[derive(Debug, Clone, Serialize)]
pub struct StoredResult {
    pub result_type: String,
    pub script: String,
    pub severity: Severity,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredRun {
    pub id: String,
    pub seed_url: String,
    pub scope_host: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub report_json: Option<String>,
}

impl StoredRun {
    pub fn report(&self) -> Result<Option<ScanTree>, HeliosError> {
        self.report_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(HeliosError::from)
    }
}

/// Runs stored in the database at `path`, newest first.
pub fn load_runs(path: &Path) -> Result<Vec<StoredRun>, HeliosError> {
    let conn = open_connection(path)?;
    let mut stmt = conn.prepare(
        "SELECT id, seed_url, scope_host, started_at, ended_at, report_json FROM runs ORDER BY started_at DESC"
    ).map_err(|e| HeliosError::Database(format!("Query failed: {}", e)))?;

    let rows = stmt.query_map([], |row: &rusqlite::Row| {
        Ok(StoredRun {
            id: row.get(0)?,
            seed_url: row.get(1)?,
            scope_host: row.get(2)?,
            started_at: row.get(3)?,
            ended_at: row.get(4)?,
            report_json: row.get(5)?,
        })
    }).map_err(|e| HeliosError::Database(format!("Query error: {}", e)))?;

    let mut runs = Vec::new();
    for row in rows {
        runs.push(row.map_err(|e| HeliosError::Database(format!("Row error: {}", e)))?);
    }
    Ok(runs)
}

/// Results recorded for one run, in insertion order.
pub fn load_results(path: &Path, run_id: &str) -> Result<Vec<StoredResult>, HeliosError> {
    let conn = open_connection(path)?;
    let mut stmt = conn.prepare(
        "SELECT result_type, script, severity, text, created_at FROM results WHERE run_id = ?1 ORDER BY rowid"
    ).map_err(|e| HeliosError::Database(format!("Query failed: {}", e)))?;

    let rows = stmt.query_map(rusqlite::params![run_id], |row: &rusqlite::Row| {
        let level: u8 = row.get(2)?;
        Ok(StoredResult {
            result_type: row.get(0)?,
            script: row.get(1)?,
            severity: Severity::from_level(level),
            text: row.get(3)?,
            created_at: row.get(4)?,
        })
    }).map_err(|e| HeliosError::Database(format!("Query error: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| HeliosError::Database(format!("Row error: {}", e)))?);
    }
    Ok(results)
}
