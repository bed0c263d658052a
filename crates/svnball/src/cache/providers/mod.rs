//! # Record Stores
//!
//! This module contains the different record store implementations.

pub use self::file::FileStore;
pub use self::memory::MemoryStore;
pub use self::provider::RecordStore;

pub mod provider;

pub mod file;
pub mod memory;
