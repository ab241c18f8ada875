// Channel Ingestion Pipeline - Core
//
// This crate provides the background pipeline that polls subscribed channels
// on a schedule, dedupes discovered items, and downloads/transcodes each new
// item through the external extraction tool, tracking per-episode state with
// classified retry/backoff.
//
// HTTP serving, authentication, and feed rendering are deliberately not part
// of this crate.

pub mod config;
pub mod domains;
pub mod kernel;
pub mod stores;

pub use config::*;
