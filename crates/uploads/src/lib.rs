//! Resumable upload engine.
//!
//! An upload is either a single-pass whole file or a sequence of chunks
//! written at arbitrary offsets. Each upload gets its own scratch directory
//! and an [`UploadSession`] tracking it; sessions live in a [`SessionCache`]
//! that evicts them after an idle period. Scratch cleanup runs on the
//! [`Sweeper`], a bounded background deletion queue.

pub mod cache;
pub mod error;
pub mod session;
pub mod sweeper;

pub use cache::SessionCache;
pub use error::UploadError;
pub use session::{ChunkOutcome, UploadId, UploadSession};
pub use sweeper::Sweeper;
