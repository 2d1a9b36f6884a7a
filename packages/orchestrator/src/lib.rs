//! QGB Orchestrator - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod cache;
pub mod config;
pub mod orchestrator;
pub mod replay;
pub mod server;
pub mod signer;
