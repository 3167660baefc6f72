//! Real-time tally service for a single poll.
//!
//! Votes are counted in an in-memory cache, pushed to WebSocket subscribers
//! as they happen, and mirrored into Postgres by a background reconciler.

pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod startup;
pub mod store;
pub mod tally;
pub mod ws;
