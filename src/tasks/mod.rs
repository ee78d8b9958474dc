//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside a store.
//!
//! # Tasks
//! - Purge: Removes expired and version-stale entries at configured intervals

mod purge;

pub use purge::spawn_purge_task;
