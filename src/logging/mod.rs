// file: src/logging/mod.rs
// version: 1.0.0
// guid: 5c1e8f20-3a9d-4b67-8e02-d74f19c6ab58

//! Logging initialization

pub mod logger;

pub use logger::init_logger;
