//! Fast cache implementations.

pub mod inmemory;

pub use inmemory::InMemoryMessageCache;
