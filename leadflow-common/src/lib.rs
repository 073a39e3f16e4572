//! # Leadflow Common Library
//!
//! Shared code for the Leadflow services:
//! - Lead, insight and event data model
//! - Record store schema and queries (SQLite)
//! - Event channel abstraction and its durable SQLite stream
//! - Classifier interface and the rule-based classifier
//! - Configuration loading and logging bootstrap
//! - Content hashing and log masking helpers

pub mod channel;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod models;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
