mod builder;
mod directive;
mod payload;

pub use builder::{PrinterCommandBuilder, ReceiptLayout};
pub use directive::{Alignment, PrintDirective};
pub use payload::{ReceiptItem, ReceiptPayload};
