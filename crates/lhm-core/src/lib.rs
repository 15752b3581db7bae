//! # lhm-core
//!
//! Core types shared across the lhm crates.
//!
//! - Shadow, failed and trigger name derivation for an origin table
//! - Physical server identity used to pin a migration to one host
//! - Cross-cutting error types

pub mod errors;
pub mod identity;
pub mod table_name;

pub use errors::CoreError;
pub use identity::ServerIdentity;
pub use table_name::{TableName, TableNamer, TriggerAction};
