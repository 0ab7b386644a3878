//! Domain models for registry-follower
//!
//! This module contains the core domain models used throughout the application.

pub mod change;
pub mod summary;

// Re-export commonly used types
pub use change::{ChangePage, ChangeRecord, ChangesResponse, FeedCursor, RawChange};
pub use summary::{DatabaseSizes, DatabaseSummary};
