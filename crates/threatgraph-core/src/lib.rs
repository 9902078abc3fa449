//! # threatgraph core
//!
//! Node keys, relationship types and property values of the threat graph,
//! plus the default-filling record shapes read from external feeds.

pub mod model;
pub mod records;
pub mod time;

pub use model::*;
pub use records::*;
pub use time::*;
