pub mod collaborators;
pub mod controller;
pub mod dedup;
pub mod events;
pub mod governor;
pub mod stage;
pub mod state;

pub use collaborators::Collaborators;
pub use controller::ScanController;
pub use dedup::dedupe;
pub use events::{duration_ms, PipelineEvent};
pub use governor::{clamp, ThreadGovernor, DEFAULT_THREADS, SAFE_THREAD_CAP};
pub use stage::{Stage, StageDefinition, StageFlag, StageSet, STAGES};
pub use state::{ErrorPolicy, RunConfig, RunOutcome, DEFAULT_DATABASE, DEFAULT_MAX_URLS};
