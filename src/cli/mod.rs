// file: src/cli/mod.rs
// version: 1.0.0
// guid: e2a6c430-7f18-4d92-b5ce-08a3f61d9b27

//! Command line interface

pub mod args;

pub use args::Cli;
