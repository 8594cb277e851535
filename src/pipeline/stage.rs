use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::HeliosError;

/// A user-facing toggle that enables one or more pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageFlag {
    Crawl,
    Scan,
    AdvancedScripts,
    BrowserDiscovery,
    Cms,
    #[serde(rename = "webapp")]
    WebApp,
    ExploitCorrelation,
}

impl StageFlag {
    pub const ALL: [StageFlag; 7] = [
        StageFlag::Crawl,
        StageFlag::Scan,
        StageFlag::AdvancedScripts,
        StageFlag::BrowserDiscovery,
        StageFlag::Cms,
        StageFlag::WebApp,
        StageFlag::ExploitCorrelation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Scan => "scan",
            Self::AdvancedScripts => "advanced-scripts",
            Self::BrowserDiscovery => "browser-discovery",
            Self::Cms => "cms",
            Self::WebApp => "webapp",
            Self::ExploitCorrelation => "exploit-correlation",
        }
    }
}

impl std::fmt::Display for StageFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageFlag {
    type Err = HeliosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crawl" | "crawler" => Ok(Self::Crawl),
            "scan" | "scanner" => Ok(Self::Scan),
            "adv" | "advanced-scripts" => Ok(Self::AdvancedScripts),
            "driver" | "browser-discovery" => Ok(Self::BrowserDiscovery),
            "cms" => Ok(Self::Cms),
            "webapp" => Ok(Self::WebApp),
            "msf" | "exploit-correlation" => Ok(Self::ExploitCorrelation),
            other => Err(HeliosError::Config(format!("Unknown stage '{}'", other))),
        }
    }
}

/// The set of enabled stage flags. "all" is expanded when the set is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSet(BTreeSet<StageFlag>);

impl StageSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self(StageFlag::ALL.into_iter().collect())
    }

    pub fn with(mut self, flag: StageFlag) -> Self {
        self.0.insert(flag);
        self
    }

    pub fn insert(&mut self, flag: StageFlag) {
        self.0.insert(flag);
    }

    pub fn contains(&self, flag: StageFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn contains_all(&self, flags: &[StageFlag]) -> bool {
        flags.iter().all(|f| self.0.contains(f))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = StageFlag> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<StageFlag> for StageSet {
    fn from_iter<I: IntoIterator<Item = StageFlag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Every step the controller can execute, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Login,
    FilesystemDiscovery,
    PreCrawlScripts,
    Crawl,
    BrowserDiscovery,
    Scan,
    PostExploitation,
    CmsFingerprint,
    WebAppFingerprint,
    ExploitCorrelation,
    ReportAssembly,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::FilesystemDiscovery => "filesystem-discovery",
            Self::PreCrawlScripts => "pre-crawl-scripts",
            Self::Crawl => "crawl",
            Self::BrowserDiscovery => "browser-discovery",
            Self::Scan => "scan",
            Self::PostExploitation => "post-exploitation",
            Self::CmsFingerprint => "cms-fingerprint",
            Self::WebAppFingerprint => "webapp-fingerprint",
            Self::ExploitCorrelation => "exploit-correlation",
            Self::ReportAssembly => "report-assembly",
        }
    }

    pub fn definition(&self) -> &'static StageDefinition {
        match self {
            Self::Login => &STAGES[0],
            Self::FilesystemDiscovery => &STAGES[1],
            Self::PreCrawlScripts => &STAGES[2],
            Self::Crawl => &STAGES[3],
            Self::BrowserDiscovery => &STAGES[4],
            Self::Scan => &STAGES[5],
            Self::PostExploitation => &STAGES[6],
            Self::CmsFingerprint => &STAGES[7],
            Self::WebAppFingerprint => &STAGES[8],
            Self::ExploitCorrelation => &STAGES[9],
            Self::ReportAssembly => &STAGES[10],
        }
    }

    pub fn display_name(&self) -> &'static str {
        self.definition().display_name
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct StageDefinition {
    pub stage: Stage,
    pub display_name: &'static str,
    /// Flags that must all be enabled for the stage to run. Empty means
    /// the stage is gated by something other than a flag.
    pub requires: &'static [StageFlag],
}

/// Stage definitions in pipeline order. `Stage::definition` indexes this table.
pub static STAGES: [StageDefinition; 11] = [
    StageDefinition {
        stage: Stage::Login,
        display_name: "Login",
        requires: &[],
    },
    StageDefinition {
        stage: Stage::FilesystemDiscovery,
        display_name: "Filesystem Discovery",
        requires: &[StageFlag::Crawl, StageFlag::Scan],
    },
    StageDefinition {
        stage: Stage::PreCrawlScripts,
        display_name: "Pre-crawl Scripts",
        requires: &[StageFlag::Crawl, StageFlag::AdvancedScripts],
    },
    StageDefinition {
        stage: Stage::Crawl,
        display_name: "Crawler",
        requires: &[StageFlag::Crawl],
    },
    StageDefinition {
        stage: Stage::BrowserDiscovery,
        display_name: "Browser Discovery",
        requires: &[StageFlag::BrowserDiscovery],
    },
    StageDefinition {
        stage: Stage::Scan,
        display_name: "Scanner",
        requires: &[StageFlag::Scan],
    },
    StageDefinition {
        stage: Stage::PostExploitation,
        display_name: "Post Scripts",
        requires: &[StageFlag::AdvancedScripts],
    },
    StageDefinition {
        stage: Stage::CmsFingerprint,
        display_name: "CMS Fingerprint",
        requires: &[StageFlag::Cms],
    },
    StageDefinition {
        stage: Stage::WebAppFingerprint,
        display_name: "WebApp Fingerprint",
        requires: &[StageFlag::WebApp],
    },
    StageDefinition {
        stage: Stage::ExploitCorrelation,
        display_name: "Exploit Correlation",
        requires: &[StageFlag::ExploitCorrelation],
    },
    StageDefinition {
        stage: Stage::ReportAssembly,
        display_name: "Report Assembly",
        requires: &[],
    },
];
