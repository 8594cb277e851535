use std::path::PathBuf;

use crate::config::{BrowserConfig, ExploitBridgeConfig, LoginConfig};
use crate::errors::HeliosError;
use crate::models::scan_tree::ScanTree;
use super::governor::ThreadGovernor;
use super::stage::{Stage, StageSet};

pub const DEFAULT_MAX_URLS: usize = 200;
pub const DEFAULT_DATABASE: &str = "helios.db";

/// Whether errors escaping the stage sequence are re-raised to the caller
/// after cleanup, or swallowed with a shutdown warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub propagate: bool,
}

impl ErrorPolicy {
    pub fn from_verbosity(verbose: u8) -> Self {
        Self { propagate: verbose > 0 }
    }
}

/// Immutable configuration for a single run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub thread_count: usize,
    pub governor: ThreadGovernor,
    pub max_urls: usize,
    pub stages: StageSet,
    pub output_path: Option<PathBuf>,
    pub database_path: PathBuf,
    pub user_agent: Option<String>,
    pub scan_options: Vec<String>,
    pub scope_options: Option<String>,
    pub login: Option<LoginConfig>,
    pub browser: BrowserConfig,
    pub exploit: ExploitBridgeConfig,
    pub error_policy: ErrorPolicy,
    pub ssl_verify: bool,
    pub http_retries: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        let governor = ThreadGovernor::default();
        Self {
            thread_count: governor.default_threads,
            governor,
            max_urls: DEFAULT_MAX_URLS,
            stages: StageSet::empty(),
            output_path: None,
            database_path: PathBuf::from(DEFAULT_DATABASE),
            user_agent: None,
            scan_options: Vec::new(),
            scope_options: None,
            login: None,
            browser: BrowserConfig::default(),
            exploit: ExploitBridgeConfig::default(),
            error_policy: ErrorPolicy::default(),
            ssl_verify: false,
            http_retries: 2,
        }
    }
}

impl RunConfig {
    /// Single activation lookup used by the controller for every stage.
    pub fn stage_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Login => self.login.is_some(),
            Stage::ReportAssembly => true,
            other => self.stages.contains_all(other.definition().requires),
        }
    }
}

/// How a run ended when no error was propagated to the caller.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Box<ScanTree>),
    Interrupted,
    Aborted { error: HeliosError },
}

impl RunOutcome {
    pub fn tree(&self) -> Option<&ScanTree> {
        match self {
            Self::Completed(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}
