//! lostboard/crates/storage-adapters/src/lib.rs
//!
//! Implementations of the backend ports declared in `domains`.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::MemoryBackend;
