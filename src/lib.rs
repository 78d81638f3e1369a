pub mod auth;
pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod export;
pub mod http;
pub mod reconcile;
pub mod report;

pub use config::Config;
pub use error::Error;
