mod driver;
mod escpos;

pub use driver::{EscPosDriver, PrinterDriver, render};
pub use escpos::{EscPosEncoder, encode_cp850};

#[cfg(test)]
pub use driver::MockPrinterDriver;
