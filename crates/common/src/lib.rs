//! Common types shared across Chorus crates.
//!
//! This crate holds the error taxonomy and the batch data model that the
//! adapters, the cache and the orchestrator all speak.

pub mod error;
pub mod request;
pub mod response;

pub use error::{ChorusError, Result};
pub use request::{ModelRef, RequestKey};
pub use response::ResponseSet;
