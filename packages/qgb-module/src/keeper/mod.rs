//! Keeper: reads and writes of module state.
//!
//! Handlers in `execute/`, `query` and `abci` go through these functions
//! rather than touching the storage maps directly.
//! - `attestation` - Nonce-ordered attestation store
//! - `valset` - Current and historical validator sets
//! - `data_commitment` - Data commitment ranges
//! - `confirm` - Orchestrator confirms
//! - `registry` - Validator EVM addresses and orchestrators

mod attestation;
mod confirm;
mod data_commitment;
mod registry;
mod valset;

pub use attestation::*;
pub use confirm::*;
pub use data_commitment::*;
pub use registry::*;
pub use valset::*;

use chrono::{DateTime, Utc};
use cosmwasm_std::Env;

use crate::error::ModuleError;

/// Block time of `env` as a UTC timestamp
pub fn block_time(env: &Env) -> Result<DateTime<Utc>, ModuleError> {
    let time = env.block.time;
    let seconds = i64::try_from(time.seconds()).map_err(|_| ModuleError::CorruptedStore {
        reason: format!("block time {} out of range", time),
    })?;
    DateTime::from_timestamp(seconds, time.subsec_nanos() as u32).ok_or_else(|| {
        ModuleError::CorruptedStore {
            reason: format!("block time {} out of range", time),
        }
    })
}
