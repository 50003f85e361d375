//! Library surface for the FINS/UDP to OPC UA bridge with CSV fallback.
//! The binary entry point lives in `main.rs`; this crate exists so the
//! components below can be unit- and integration-tested independently.

pub mod acquisition;
pub mod coerce;
pub mod config;
pub mod error;
pub mod fins;
pub mod planner;
pub mod plc_log;
pub mod sample;
pub mod shutdown;
pub mod sinks;
pub mod supervisor;
