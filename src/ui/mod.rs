//! Terminal and JSON output.
pub mod output;
