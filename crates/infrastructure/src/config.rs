use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use domain::{BackendKind, ReceiptLayout, ScaleProtocol};
use serde::{Deserialize, Serialize};

/// Which backend to run. `Auto` probes host capabilities.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    #[default]
    Auto,
    InPage,
    DesktopShell,
    NativeBridge,
}

impl BackendPreference {
    pub fn forced(&self) -> Option<BackendKind> {
        match self {
            Self::Auto => None,
            Self::InPage => Some(BackendKind::InPage),
            Self::DesktopShell => Some(BackendKind::DesktopShell),
            Self::NativeBridge => Some(BackendKind::NativeBridge),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScaleSettings {
    #[serde(default)]
    pub default_protocol: ScaleProtocol,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Bound applied by the privileged host to every weight request
    #[serde(default = "default_host_read_timeout_ms")]
    pub host_read_timeout_ms: u64,
}

fn default_read_timeout_ms() -> u64 {
    3000
}
fn default_host_read_timeout_ms() -> u64 {
    5000
}

impl ScaleSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn host_read_timeout(&self) -> Duration {
        Duration::from_millis(self.host_read_timeout_ms)
    }
}

impl Default for ScaleSettings {
    fn default() -> Self {
        Self {
            default_protocol: ScaleProtocol::default(),
            read_timeout_ms: default_read_timeout_ms(),
            host_read_timeout_ms: default_host_read_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrinterSettings {
    #[serde(default = "default_printer_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_printer_columns")]
    pub columns: usize,
    #[serde(default = "default_store_name")]
    pub store_name: String,
    #[serde(default = "default_footer")]
    pub footer: String,
    #[serde(default = "default_currency_prefix")]
    pub currency_prefix: String,
    #[serde(default = "default_feed_lines")]
    pub feed_lines: u8,
}

fn default_printer_baud_rate() -> u32 {
    9600
}
fn default_printer_columns() -> usize {
    48
}
fn default_store_name() -> String {
    ReceiptLayout::default().store_name
}
fn default_footer() -> String {
    ReceiptLayout::default().footer
}
fn default_currency_prefix() -> String {
    ReceiptLayout::default().currency_prefix
}
fn default_feed_lines() -> u8 {
    ReceiptLayout::default().feed_lines
}

impl PrinterSettings {
    pub fn layout(&self) -> ReceiptLayout {
        ReceiptLayout {
            store_name: self.store_name.clone(),
            footer: self.footer.clone(),
            currency_prefix: self.currency_prefix.clone(),
            feed_lines: self.feed_lines,
        }
    }
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            baud_rate: default_printer_baud_rate(),
            columns: default_printer_columns(),
            store_name: default_store_name(),
            footer: default_footer(),
            currency_prefix: default_currency_prefix(),
            feed_lines: default_feed_lines(),
        }
    }
}

/// Simulated devices of the native bridge
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SimulationSettings {
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
}

fn default_latency_ms() -> u64 {
    400
}
fn default_min_weight() -> f64 {
    0.05
}
fn default_max_weight() -> f64 {
    5.0
}

impl SimulationSettings {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            min_weight: default_min_weight(),
            max_weight: default_max_weight(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BluetoothSettings {
    #[serde(default = "default_scan_ms")]
    pub scan_ms: u64,
    /// Bytes per BLE write
    #[serde(default = "default_write_chunk")]
    pub write_chunk: usize,
}

fn default_scan_ms() -> u64 {
    3000
}
fn default_write_chunk() -> usize {
    180
}

impl Default for BluetoothSettings {
    fn default() -> Self {
        Self {
            scan_ms: default_scan_ms(),
            write_chunk: default_write_chunk(),
        }
    }
}

/// Privileged host process spawned by the desktop-shell backend
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ShellSettings {
    #[serde(default)]
    pub host_program: Option<String>,
    #[serde(default)]
    pub host_args: Vec<String>,
}

/// System notifications raised by the device host
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationSettings {
    /// false logs notifications instead of showing them
    #[serde(default = "default_desktop")]
    pub desktop: bool,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_desktop() -> bool {
    true
}
fn default_app_name() -> String {
    "POS Peripherals".to_string()
}
fn default_notify_timeout_ms() -> u64 {
    3000
}

impl NotificationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            desktop: default_desktop(),
            app_name: default_app_name(),
            timeout_ms: default_notify_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PeripheralConfig {
    #[serde(default)]
    pub backend: BackendPreference,
    #[serde(default)]
    pub scale: ScaleSettings,
    #[serde(default)]
    pub printer: PrinterSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub bluetooth: BluetoothSettings,
    #[serde(default)]
    pub shell: ShellSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl PeripheralConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("backend", "auto")?
            // Local config file, e.g. config/default.toml
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            // Per-mode overrides, e.g. config/development.toml
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Environment variables (e.g. PERIPHERALS__SCALE__READ_TIMEOUT_MS=2000)
            .add_source(Environment::with_prefix("PERIPHERALS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
