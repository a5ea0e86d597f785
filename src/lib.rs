//! polyexec: runs untrusted source code in many languages inside
//! resource-capped, auto-removed containers.

pub mod backoff;
pub mod config;
pub mod engine;
pub mod error;
pub mod images;
pub mod language;
pub mod result;
pub mod sandbox;
pub mod workspace;

pub use engine::{Engine, ExecutionRequest};
pub use error::ExecutionError;
pub use result::ExecutionResult;
