//! Core data models for the video summaries API.
//!
//! Metadata records are semi-structured JSON documents read from the object
//! store; properties records carry the per-video archive flag kept in SQLite.

pub mod properties;
pub mod video;
