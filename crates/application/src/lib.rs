//! Application layer - the peripheral use cases
//!
//! `PeripheralService` is the one API the rest of the POS talks to;
//! `HostEnvironment` decides which transport backend sits behind it.

pub mod peripheral;

pub use peripheral::{HostEnvironment, PeripheralService};
