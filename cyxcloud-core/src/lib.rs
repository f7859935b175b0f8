//! Core types shared by the coordinator's crates: the error taxonomy and
//! the tunable constants from the external-interfaces configuration block.

pub mod config;
pub mod error;

pub use config::{CoordinatorConfig, CHUNK_SIZE};
pub use error::{CoordinatorError, Result};
