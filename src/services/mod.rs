//! Store clients and the operations built on top of them.

pub mod flag_store;
pub mod metadata;
pub mod object_store;
pub mod summaries;
pub mod video_service;
