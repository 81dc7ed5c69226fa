//! Store implementations of [`Session`](crate::executor::Session).

pub mod memory;

pub use memory::MemoryStore;
