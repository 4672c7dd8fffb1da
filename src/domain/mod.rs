//! Domain model: requests, engine contract, issuance records and the ports
//! the application layer depends on.

pub mod engine;
pub mod ports;
pub mod record;
pub mod request;
