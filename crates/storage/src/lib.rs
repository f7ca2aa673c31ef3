//! Storage abstraction and implementations for Everyday.
//!
//! This crate provides a trait-based storage interface with a JSON file
//! backend and an in-memory backend.

#![warn(missing_docs)]

pub mod trait_;
pub mod snapshot;
pub mod json_storage;
pub mod memory;

pub use trait_::{RoutineStore, StorageError, Result, LAST_ADVANCED_DAY, LAST_REMINDER_DAY};
pub use snapshot::StoreSnapshot;
pub use json_storage::JsonStorage;
pub use memory::MemoryStorage;
