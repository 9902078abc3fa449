//! # Threatgraph CLI
//!
//! Command-line front end: build the threat graph from ATT&CK, Pulsedive and
//! OTX, then report statistics and activity over it.

pub mod commands;
pub mod output;

pub use commands::*;
