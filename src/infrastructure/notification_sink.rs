use crate::domain::models::{AdhanSound, PermissionState};
use crate::infrastructure::error::InfraError;
use std::sync::{Arc, Mutex};

const DEFAULT_ICON: &str = "/pwa-192x192.png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOptions {
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub url: String,
    /// Dedup key text; also used as the platform tag.
    pub tag: Option<String>,
    pub sound: Option<AdhanSound>,
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self {
            icon: DEFAULT_ICON.to_string(),
            badge: DEFAULT_ICON.to_string(),
            vibrate: vec![200, 100, 200],
            url: "/".to_string(),
            tag: None,
            sound: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub options: NotificationOptions,
}

/// Host notification facility. Permission is tri-state and is read before every send.
pub trait NotificationSink: Send + Sync {
    fn permission(&self) -> PermissionState;
    fn request_permission(&self) -> Result<PermissionState, InfraError>;
    fn show(&self, notification: &Notification) -> Result<(), InfraError>;
}

/// Foreground sink that renders notifications into the log.
///
/// `request_permission` resolves a `default` state to the configured answer;
/// a `denied` state never changes from inside the process.
#[derive(Debug)]
pub struct LoggingNotificationSink {
    permission: Mutex<PermissionState>,
    grant_on_request: bool,
}

impl LoggingNotificationSink {
    pub fn new(initial: PermissionState, grant_on_request: bool) -> Self {
        Self {
            permission: Mutex::new(initial),
            grant_on_request,
        }
    }
}

impl NotificationSink for LoggingNotificationSink {
    fn permission(&self) -> PermissionState {
        self.permission
            .lock()
            .map(|state| *state)
            .unwrap_or(PermissionState::Denied)
    }

    fn request_permission(&self) -> Result<PermissionState, InfraError> {
        let mut state = self
            .permission
            .lock()
            .map_err(|error| InfraError::lock_poisoned("notification permission", error))?;
        if *state == PermissionState::Default {
            *state = if self.grant_on_request {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            };
        }
        Ok(*state)
    }

    fn show(&self, notification: &Notification) -> Result<(), InfraError> {
        if self.permission() != PermissionState::Granted {
            return Err(InfraError::PermissionDenied);
        }
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            tag = notification.options.tag.as_deref().unwrap_or(""),
            sound = notification.options.sound.and_then(AdhanSound::audio_url).unwrap_or("none"),
            "notification shown"
        );
        Ok(())
    }
}

/// Routes delivery to the background path when one is registered, else to the
/// foreground sink. Permission always comes from the foreground host.
#[derive(Clone)]
pub struct DeliveryRouter {
    foreground: Arc<dyn NotificationSink>,
    background: Option<Arc<dyn NotificationSink>>,
}

impl DeliveryRouter {
    pub fn new(foreground: Arc<dyn NotificationSink>) -> Self {
        Self {
            foreground,
            background: None,
        }
    }

    pub fn with_background(mut self, background: Arc<dyn NotificationSink>) -> Self {
        self.background = Some(background);
        self
    }
}

impl NotificationSink for DeliveryRouter {
    fn permission(&self) -> PermissionState {
        self.foreground.permission()
    }

    fn request_permission(&self) -> Result<PermissionState, InfraError> {
        self.foreground.request_permission()
    }

    fn show(&self, notification: &Notification) -> Result<(), InfraError> {
        match self.background.as_ref() {
            Some(background) => background.show(notification),
            None => self.foreground.show(notification),
        }
    }
}
