use crate::domain::models::NotificationKey;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::fired_keys::FiredKeyStore;
use crate::infrastructure::notification_sink::{Notification, NotificationOptions, NotificationSink};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_PUSH_TITLE: &str = "Mawaqit";
const DEFAULT_PUSH_BODY: &str = "New Notification";
const DEFAULT_PUSH_URL: &str = "/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushMessage {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    /// Dedup key text, `{event}-{kind}-{YYYY-MM-DD}`.
    pub key: Option<String>,
}

impl PushMessage {
    /// Absent or unreadable payloads become an empty message shown with defaults.
    pub fn from_payload(payload: Option<&str>) -> Self {
        let Some(raw) = payload.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };
        serde_json::from_str(raw).unwrap_or_else(|error| {
            tracing::warn!(%error, "unreadable push payload; using defaults");
            Self::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Shown(Notification),
    Duplicate(NotificationKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Focused,
    Opened(String),
}

/// Host windows of the application.
pub trait WindowHost: Send + Sync {
    /// Focuses an already open window; `false` when none exists.
    fn focus_existing(&self) -> Result<bool, InfraError>;
    fn open(&self, url: &str) -> Result<(), InfraError>;
}

/// Headless host: there is never a window to focus, opening is logged.
#[derive(Debug, Default)]
pub struct LoggingWindowHost;

impl WindowHost for LoggingWindowHost {
    fn focus_existing(&self) -> Result<bool, InfraError> {
        Ok(false)
    }

    fn open(&self, url: &str) -> Result<(), InfraError> {
        tracing::info!(%url, "open window requested");
        Ok(())
    }
}

/// Push-driven delivery running beside the tick loop. Both consult the same
/// durable [`FiredKeyStore`], so a logical notification is shown at most once.
pub struct BackgroundDelivery {
    fired_keys: Arc<dyn FiredKeyStore>,
    sink: Arc<dyn NotificationSink>,
    windows: Arc<dyn WindowHost>,
}

impl BackgroundDelivery {
    pub fn new(
        fired_keys: Arc<dyn FiredKeyStore>,
        sink: Arc<dyn NotificationSink>,
        windows: Arc<dyn WindowHost>,
    ) -> Self {
        Self {
            fired_keys,
            sink,
            windows,
        }
    }

    pub fn handle_push(&self, payload: Option<&str>) -> Result<PushOutcome, InfraError> {
        let message = PushMessage::from_payload(payload);

        let key = message.key.as_deref().and_then(|raw| match raw.parse::<NotificationKey>() {
            Ok(key) => Some(key),
            Err(error) => {
                tracing::warn!(key = raw, %error, "push carries an unreadable dedup key");
                None
            }
        });
        if let Some(key) = key {
            if !self.fired_keys.mark_if_absent(&key)? {
                tracing::debug!(key = %key, "push already delivered; dropping");
                return Ok(PushOutcome::Duplicate(key));
            }
        }

        let notification = Notification {
            title: message.title.unwrap_or_else(|| DEFAULT_PUSH_TITLE.to_string()),
            body: message.body.unwrap_or_else(|| DEFAULT_PUSH_BODY.to_string()),
            options: NotificationOptions {
                url: message.url.unwrap_or_else(|| DEFAULT_PUSH_URL.to_string()),
                tag: key.map(|key| key.to_string()),
                ..NotificationOptions::default()
            },
        };
        self.sink.show(&notification)?;
        tracing::info!(title = %notification.title, "push notification shown");
        Ok(PushOutcome::Shown(notification))
    }

    pub fn handle_click(&self, notification: &Notification) -> Result<ClickOutcome, InfraError> {
        if self.windows.focus_existing()? {
            return Ok(ClickOutcome::Focused);
        }
        let url = notification.options.url.clone();
        self.windows.open(&url)?;
        Ok(ClickOutcome::Opened(url))
    }
}
