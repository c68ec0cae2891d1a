//! Domain layer - peripheral model with no I/O
//!
//! This crate contains:
//! - Entities (Device, WeightReading, ReceiptPayload)
//! - Value Objects (ScaleProtocol, ScaleConfig, PrintDirective)
//! - The device status state machine and the connection registry
//! - The receipt command builder (pure, deterministic)
//! - The error taxonomy shared by every backend
//!
//! Principles:
//! - No dependencies on infrastructure
//! - Every status transition goes through `ConnectionRegistry`
//! - Testable in isolation

pub mod device;
pub mod error;
pub mod host;
pub mod receipt;
pub mod registry;
pub mod result;
pub mod weight;

// Re-export commonly used types
pub use device::{ConnectionMedium, Device, DeviceKind, DeviceStatus, ScaleConfig, ScaleProtocol};
pub use error::{FailureReason, PeripheralError};
pub use host::{BackendKind, HostCapabilities};
pub use receipt::{Alignment, PrintDirective, PrinterCommandBuilder, ReceiptItem, ReceiptLayout, ReceiptPayload};
pub use registry::ConnectionRegistry;
pub use result::{OperationResult, ScanResult, WeightResult};
pub use weight::{WeightReading, WeightUnit};
