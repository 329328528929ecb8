//! Clipsync Database Library
//!
//! SQLite-backed ledger of seen events, their upload state and retry counters.

pub mod db;

pub use db::{connect, EventRepository};
