use serde::{Deserialize, Serialize};
use std::fmt;

/// The three transport environments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The process owns the serial port directly
    InPage,
    /// Commands are relayed to a privileged host process
    DesktopShell,
    /// Platform plugins (serial, BLE), simulated when absent
    NativeBridge,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InPage => "in_page",
            Self::DesktopShell => "desktop_shell",
            Self::NativeBridge => "native_bridge",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the current host exposes, probed once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCapabilities {
    pub native_bridge: bool,
    pub shell_channel: bool,
}

impl HostCapabilities {
    /// Native bridge first, then the privileged shell, then in-page.
    pub fn select(&self) -> BackendKind {
        if self.native_bridge {
            BackendKind::NativeBridge
        } else if self.shell_channel {
            BackendKind::DesktopShell
        } else {
            BackendKind::InPage
        }
    }

    pub fn supports(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::InPage => true,
            BackendKind::DesktopShell => self.shell_channel,
            BackendKind::NativeBridge => self.native_bridge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_precedence() {
        let caps = HostCapabilities {
            native_bridge: true,
            shell_channel: true,
        };
        assert_eq!(caps.select(), BackendKind::NativeBridge);

        let caps = HostCapabilities {
            native_bridge: false,
            shell_channel: true,
        };
        assert_eq!(caps.select(), BackendKind::DesktopShell);

        assert_eq!(HostCapabilities::default().select(), BackendKind::InPage);
    }

    #[test]
    fn test_in_page_is_always_supported() {
        let caps = HostCapabilities::default();
        assert!(caps.supports(BackendKind::InPage));
        assert!(!caps.supports(BackendKind::DesktopShell));
        assert!(!caps.supports(BackendKind::NativeBridge));
    }
}
