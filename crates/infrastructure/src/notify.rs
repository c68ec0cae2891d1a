use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use notify_rust::Notification;

use domain::PeripheralError;

use crate::config::NotificationSettings;

/// User-visible system notifications raised by the privileged host.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<(), PeripheralError>;
}

/// Writes notifications to the log. Hosts without a notification service use this.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), PeripheralError> {
        tracing::info!(title = %title, body = %body, "Notification");
        Ok(())
    }
}

/// Shows notifications through the desktop's notification service.
///
/// Delivery runs on the blocking pool under `timeout`. When no service
/// answers in time the notification goes to `fallback` instead, so a
/// headless host never fails a print because of it.
#[derive(Clone)]
pub struct DesktopNotifier {
    app_name: String,
    timeout: Duration,
    fallback: Arc<dyn Notifier>,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            app_name: app_name.into(),
            timeout,
            fallback: Arc::new(LogNotifier),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Notifier>) -> Self {
        self.fallback = fallback;
        self
    }

    async fn show(&self, title: &str, body: &str) -> Result<(), String> {
        let notification = Notification::new()
            .appname(&self.app_name)
            .summary(title)
            .body(body)
            .finalize();

        let shown = tokio::task::spawn_blocking(move || {
            notification.show().map(|_| ()).map_err(|e| e.to_string())
        });
        match tokio::time::timeout(self.timeout, shown).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(join.to_string()),
            Err(_) => Err(format!(
                "no answer within {}ms",
                self.timeout.as_millis()
            )),
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), PeripheralError> {
        match self.show(title, body).await {
            Ok(()) => {
                tracing::debug!(title = %title, "Desktop notification shown");
                Ok(())
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, "Desktop notification unavailable");
                self.fallback.notify(title, body).await
            }
        }
    }
}

/// Notifier the device host uses for the given settings.
pub fn system_notifier(settings: &NotificationSettings) -> Arc<dyn Notifier> {
    if settings.desktop {
        Arc::new(DesktopNotifier::new(
            settings.app_name.clone(),
            settings.timeout(),
        ))
    } else {
        Arc::new(LogNotifier)
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), PeripheralError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}
