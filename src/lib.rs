//! Duplicate video detection over a scanned video library.
//!
//! Videos are grouped in three tiers: exact duplicates by metadata, near
//! duplicates by looser metadata, and visually similar clips by sampled frame
//! descriptors. Each tier only sees the videos the earlier tiers left
//! unclaimed.

pub mod cache;
pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod export;
pub mod library;
pub mod logging;
pub mod media;
pub mod results;
pub mod scanner;
