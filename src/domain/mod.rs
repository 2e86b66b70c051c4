//! Tool registry and the built-in tools it serves
//!
//! Everything the MCP layer invokes through `tools/list` and `tools/call`.

pub mod calculator;
pub mod registry;
pub mod tools;
pub mod utils;
