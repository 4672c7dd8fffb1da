//! Application layer orchestrating license issuance.
//!
//! This module defines the `IssuanceOrchestrator`, the single entry point
//! callers use to obtain a license. It composes request validation, the
//! signing engine and the issuance store, which it receives at construction.

pub mod orchestrator;
