pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod observability;
pub mod storage;
pub mod sync;
pub mod worker;

pub use error::{EngineError, Result};
