//! Blocking HTTP transport used to reach the identity endpoints and the dependent services.
pub mod client;
pub mod config;
