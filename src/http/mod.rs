pub mod client;
#[cfg(test)]
pub(crate) mod test_server;

pub use client::{apply_session, build_client, jar_cookies, seed_jar, HttpSettings, DEFAULT_USER_AGENT};
