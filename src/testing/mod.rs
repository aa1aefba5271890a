//! Testing utilities and mock implementations
//!
//! Drives the supervisors without a radio driver or an MQTT broker.

pub mod mocks;

pub use mocks::*;
