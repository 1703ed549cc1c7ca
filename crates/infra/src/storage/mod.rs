//! Non-database storage adapters

pub mod memory;

pub use memory::MemoryKeyValueStore;
