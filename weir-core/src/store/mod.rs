//! Store implementations that live in the core crate.

pub mod memory;

pub use memory::MemoryStore;
