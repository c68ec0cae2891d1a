mod environment;
mod service;

pub use environment::HostEnvironment;
pub use service::PeripheralService;
