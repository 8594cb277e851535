pub mod auth;
pub mod browser;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod db;
pub mod discovery;
pub mod errors;
pub mod exploit;
pub mod fingerprint;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod scan;
pub mod scope;
