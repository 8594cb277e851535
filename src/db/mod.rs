pub mod connection;
pub mod results;
pub mod schema;
pub mod sink;

pub use connection::SqliteSink;
pub use results::{load_results, load_runs, StoredResult, StoredRun};
pub use sink::ResultSink;
