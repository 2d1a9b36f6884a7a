//! Execute handlers for the QGB attestation module.
//!
//! - `confirm` - ValsetConfirm and DataCommitmentConfirm from orchestrators
//! - `registry` - EVM address registration by validator operators
//! - `admin` - Params and admin updates

mod admin;
mod confirm;
mod registry;

pub use admin::*;
pub use confirm::*;
pub use registry::*;
