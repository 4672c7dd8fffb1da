//! Adapters for the domain ports: the process-backed signing engine and the
//! issuance store backends.

pub mod in_memory;
pub mod process_engine;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sqlite;
