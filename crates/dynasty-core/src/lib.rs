// Library root: re-exports all modules so the binary and integration tests
// can reach the crate's public API.

pub mod calibration;
pub mod config;
pub mod db;
pub mod drift;
pub mod import;
pub mod model;
pub mod stats;
pub mod store;
pub mod valuation;
