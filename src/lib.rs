//! logbus - bounded, observable, persisted log event bus
//!
//! This library provides the bus itself plus the configuration and process
//! logging used by the `logbus` binary.

pub mod bus;
pub mod config;
pub mod ingest;
pub mod logging;
