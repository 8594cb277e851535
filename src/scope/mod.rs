pub mod matcher;

pub use matcher::{ScopeConfig, ScopeOptions};
