//! File-backed JSON token documents with hot reload.
//!
//! A [`TokenStore`] wraps a single JSON object document on disk. The server
//! uses two of them: one mapping file names to their download tokens, one
//! mapping API usernames to passwords. Mutations happen in memory and are
//! made durable with an explicit [`TokenStore::save`]; external edits to the
//! file are picked up by a filesystem watcher.

pub mod error;
pub mod store;

pub use error::TokenStoreError;
pub use store::TokenStore;
