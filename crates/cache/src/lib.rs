//! SQLite-backed completion cache for Chorus.
//!
//! Keys are `"<provider>/<model>:<prompt>"` strings and values are raw
//! completion text. A store is opened for one batch and closed when the
//! batch ends. Writes are staged by the caller and committed in a single
//! transaction; a later write to an existing key replaces it.

pub mod store;

pub use store::{CacheStore, DEFAULT_CACHE_FILE};
