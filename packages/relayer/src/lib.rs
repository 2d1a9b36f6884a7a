//! QGB Relayer - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod config;
pub mod evm_client;
pub mod relayer;
pub mod server;
