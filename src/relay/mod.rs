//! Relay from the broker queue to the ingestion endpoint

pub mod consumer;
pub mod supervisor;

pub use consumer::{Disposition, LoopExit, Relay};
pub use supervisor::{Supervisor, SupervisorError};
