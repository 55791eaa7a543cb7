//! # Infrastructure Adapters
//!
//! Implementations of the key-value store and response cache interfaces.

pub mod filesystem_store;
pub mod memory_store;

pub use filesystem_store::FilesystemKeyValueStore;
pub use memory_store::InMemoryKeyValueStore;
