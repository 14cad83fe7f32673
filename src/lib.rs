// file: src/lib.rs
// version: 1.0.0
// guid: 3f7a2c91-8b4e-4d1a-9c6f-52e8d0a17b43

//! # Medulla Bootstrap
//!
//! Provisions a fresh machine (bare server or a freshly created VirtualBox VM)
//! with a clustered Medulla stack. The orchestrator verifies prerequisites,
//! generates and vaults a set of credentials exactly once per install, renders
//! them into an inventory consumed by `ansible-playbook`, optionally creates
//! and polls a VM until it is reachable, and drives the remote install with
//! bounded retries and well-defined fatal/non-fatal failure reporting.

pub mod bootstrap;
pub mod cli;
pub mod distro;
pub mod engine;
pub mod error;
pub mod facts;
pub mod inventory;
pub mod logging;
pub mod process;
pub mod remote;
pub mod report;
pub mod secrets;
pub mod session;
pub mod vm;
pub mod wizard;

pub use error::{BootstrapError, Result};

/// Version information for the bootstrap binary
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
