//! Ambient plumbing shared by the sync engine binary and library:
//! configuration loading, the error taxonomy, and database pooling.

pub mod config;
pub mod db;
pub mod error;

pub use config::Config;
pub use error::{Error, Result, SyncOutcome};
