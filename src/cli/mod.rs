pub mod commands;
pub mod progress;
pub mod scan;

pub use commands::Cli;
