//! # Communications interface crate.
//!
//! Provides the messages exchanged between the controller and whatever
//! transport carries them. The field names on the wire follow the vehicle
//! simulator's JSON event payloads.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telemetry received from the vehicle
pub mod tlm;

/// Demands sent back to the vehicle
pub mod dems;
