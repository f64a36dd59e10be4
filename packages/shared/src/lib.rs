//! Utilities shared by the Irori binaries: logging setup and clocks.

pub mod logger;
pub mod time;
