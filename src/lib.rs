//! HTTP API over stored video metadata, summaries and archive flags.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
