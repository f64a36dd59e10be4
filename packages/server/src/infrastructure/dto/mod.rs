//! Data Transfer Objects (DTOs) for the HTTP diagnostics API.
//!
//! - `http`: request and response bodies
//! - `conversion`: hub snapshots → DTOs

pub mod conversion;
pub mod http;
