//! Per-day post counter for a BBS board archive.
//!
//! Walks a board's post archive from the newest index backward toward index 1,
//! counts posts per calendar day, and appends each completed day to a durable
//! CSV table so an interrupted run can resume where it left off.

pub mod client;
pub mod config;
pub mod crawler;
pub mod progress;
pub mod retry;
pub mod session;
