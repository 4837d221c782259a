pub mod bracket;
pub mod config;
pub mod context;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod patterns;
pub mod pool;
pub mod sampling;
pub mod scoring;
pub mod summary;

pub use error::{Result, SimError};
