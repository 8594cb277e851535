use std::path::Path;

use crate::errors::HeliosError;
use crate::models::finding::Severity;
use crate::models::scan_tree::ScanTree;

/// Append-only store for timestamped results and the final report.
///
/// The pipeline controller is the only writer and opens and closes the sink
/// exactly once per run.
pub trait ResultSink: Send + Sync {
    fn open(&self, path: &Path) -> Result<(), HeliosError>;

    fn record_run_start(&self, seed_url: &str, scope_host: &str) -> Result<(), HeliosError>;

    fn put(&self, result_type: &str, script: &str, severity: Severity, text: &str) -> Result<(), HeliosError>;

    fn record_report(&self, report: &ScanTree) -> Result<(), HeliosError>;

    fn close(&self) -> Result<(), HeliosError>;
}
