//! registry-follower - Follow a CouchDB-style registry change feed
//!
//! This crate pages through a `_changes` feed, enriches every change with the
//! full document, hands the records to a sink and persists the feed cursor so
//! a restarted follower resumes where it stopped.

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod sync;
