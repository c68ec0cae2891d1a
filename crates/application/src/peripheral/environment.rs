use std::sync::Arc;

use domain::{BackendKind, HostCapabilities, PeripheralError};
use infrastructure::config::BackendPreference;
use infrastructure::{
    DesktopShellBackend, InPageBackend, NativeBridgeBackend, PeripheralConfig, PluginHost,
    PortProvider, ShellChannel, StdioChannel, SystemPortProvider, TransportBackend, UserActivation,
};

use super::PeripheralService;

/// What the running host offers, probed once at startup.
pub struct HostEnvironment {
    pub ports: Arc<dyn PortProvider>,
    pub activation: UserActivation,
    pub plugins: Option<Arc<dyn PluginHost>>,
    pub shell: Option<Arc<dyn ShellChannel>>,
}

impl HostEnvironment {
    pub fn new(ports: Arc<dyn PortProvider>) -> Self {
        Self {
            ports,
            activation: UserActivation::new(),
            plugins: None,
            shell: None,
        }
    }

    /// System serial ports, plus the privileged host when one is configured.
    pub fn from_config(config: &PeripheralConfig) -> Result<Self, PeripheralError> {
        let mut env = Self::new(Arc::new(SystemPortProvider::new()));
        if let Some(program) = &config.shell.host_program {
            let channel = StdioChannel::spawn(program, &config.shell.host_args)?;
            env.shell = Some(Arc::new(channel));
        }
        Ok(env)
    }

    pub fn with_plugins(mut self, plugins: Arc<dyn PluginHost>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn with_shell(mut self, shell: Arc<dyn ShellChannel>) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            native_bridge: self.plugins.is_some(),
            shell_channel: self.shell.is_some(),
        }
    }

    /// Backend for this host: forced by configuration, or by capability.
    pub fn select(&self, preference: BackendPreference) -> Result<BackendKind, PeripheralError> {
        let caps = self.capabilities();
        match preference.forced() {
            Some(kind) if !caps.supports(kind) => Err(PeripheralError::CapabilityUnavailable(format!(
                "{} backend requested but not available on this host",
                kind
            ))),
            Some(kind) => Ok(kind),
            None => Ok(caps.select()),
        }
    }

    pub fn build_backend(&self, config: &PeripheralConfig) -> Result<Arc<dyn TransportBackend>, PeripheralError> {
        let backend: Arc<dyn TransportBackend> = match self.select(config.backend)? {
            BackendKind::NativeBridge => {
                let plugins = self.plugins.clone().ok_or_else(|| {
                    PeripheralError::CapabilityUnavailable("native bridge".to_string())
                })?;
                Arc::new(NativeBridgeBackend::new(
                    plugins,
                    config.printer.clone(),
                    config.simulation.clone(),
                    config.bluetooth.clone(),
                ))
            }
            BackendKind::DesktopShell => {
                let shell = self.shell.clone().ok_or_else(|| {
                    PeripheralError::CapabilityUnavailable("desktop shell channel".to_string())
                })?;
                Arc::new(DesktopShellBackend::new(shell))
            }
            BackendKind::InPage => Arc::new(InPageBackend::new(
                self.ports.clone(),
                self.activation.clone(),
                config.printer.clone(),
            )),
        };
        Ok(backend)
    }

    pub fn into_service(self, config: &PeripheralConfig) -> Result<PeripheralService, PeripheralError> {
        let backend = self.build_backend(config)?;
        Ok(PeripheralService::new(backend, &config.scale))
    }
}
