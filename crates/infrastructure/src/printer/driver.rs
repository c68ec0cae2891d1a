use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use domain::{Alignment, PeripheralError, PrintDirective};

use super::EscPosEncoder;
use crate::serial::SerialLink;

/// Printer driver primitives, in the shape of a vendor print library:
/// calls buffer a job, `execute` flushes it to the device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrinterDriver: Send {
    fn clear(&mut self);
    fn align(&mut self, alignment: Alignment);
    fn bold(&mut self, on: bool);
    fn italic(&mut self, on: bool);
    fn println(&mut self, text: &str);
    fn draw_line(&mut self);
    fn feed(&mut self, lines: u8);
    fn cut(&mut self);

    /// Send the buffered job.
    async fn execute(&mut self) -> Result<(), PeripheralError>;

    /// Release the device handle.
    async fn close(&mut self) -> Result<(), PeripheralError>;
}

/// Drive `driver` through a directive sequence, then execute the job.
pub async fn render(
    directives: &[PrintDirective],
    driver: &mut dyn PrinterDriver,
) -> Result<(), PeripheralError> {
    driver.clear();
    for directive in directives {
        match directive {
            PrintDirective::Align(alignment) => driver.align(*alignment),
            PrintDirective::Bold(on) => driver.bold(*on),
            PrintDirective::Italic(on) => driver.italic(*on),
            PrintDirective::Line(text) => driver.println(text),
            PrintDirective::Divider => driver.draw_line(),
            PrintDirective::Feed(lines) => driver.feed(*lines),
            PrintDirective::Cut => driver.cut(),
        }
    }
    driver.execute().await
}

/// ESC/POS over an open port (serial, USB CDC or `tcp://` socket).
pub struct EscPosDriver {
    link: Option<SerialLink>,
    job: EscPosEncoder,
    columns: usize,
}

impl EscPosDriver {
    pub fn new(link: SerialLink, columns: usize) -> Self {
        Self {
            link: Some(link),
            job: EscPosEncoder::new(),
            columns,
        }
    }

    fn push(&mut self, f: impl FnOnce(EscPosEncoder) -> EscPosEncoder) {
        let job = std::mem::take(&mut self.job);
        self.job = f(job);
    }
}

#[async_trait]
impl PrinterDriver for EscPosDriver {
    fn clear(&mut self) {
        self.job = EscPosEncoder::new().initialize();
    }

    fn align(&mut self, alignment: Alignment) {
        self.push(|job| job.align(alignment));
    }

    fn bold(&mut self, on: bool) {
        self.push(|job| job.bold(on));
    }

    fn italic(&mut self, on: bool) {
        self.push(|job| job.italic(on));
    }

    fn println(&mut self, text: &str) {
        self.push(|job| job.text_line(text));
    }

    fn draw_line(&mut self) {
        let columns = self.columns;
        self.push(|job| job.divider(columns));
    }

    fn feed(&mut self, lines: u8) {
        self.push(|job| job.feed(lines));
    }

    fn cut(&mut self) {
        self.push(|job| job.cut());
    }

    async fn execute(&mut self) -> Result<(), PeripheralError> {
        let bytes = std::mem::take(&mut self.job).build();
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| PeripheralError::PrintFailed("Printer is closed".to_string()))?;

        tracing::debug!(bytes = bytes.len(), "Sending print job");
        link.write_all(&bytes)
            .await
            .map_err(|e| PeripheralError::PrintFailed(format!("Write failed: {}", e)))?;
        link.flush()
            .await
            .map_err(|e| PeripheralError::PrintFailed(format!("Flush failed: {}", e)))
    }

    async fn close(&mut self) -> Result<(), PeripheralError> {
        let Some(mut link) = self.link.take() else {
            return Ok(());
        };
        link.shutdown()
            .await
            .map_err(|e| PeripheralError::Transport(format!("Failed to close printer: {}", e)))
    }
}
