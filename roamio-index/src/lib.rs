//! Roamio Index - persisted note index
//!
//! The index maps note ids to `FileRecord`s. Storage sits behind the
//! `IndexStore` trait; the shipped backend is a single JSON file inside
//! the workspace, rewritten atomically on every commit.

pub mod diff;
mod store;

pub use diff::{diff, Presence, PresenceMap};
pub use store::{IndexStore, JsonIndexStore, LoadState, StoreError};
