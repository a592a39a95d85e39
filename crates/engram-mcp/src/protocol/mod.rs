//! Tool Protocol
//!
//! JSON-RPC 2.0 over two transports: newline-delimited stdio and HTTP.

#[cfg(feature = "http")]
pub mod http;
pub mod messages;
pub mod stdio;
pub mod types;
