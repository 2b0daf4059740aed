use crate::domain::messages::{self, MessageText};
use crate::domain::models::{
    minutes_of_day, AdhanSound, EventName, Language, NotificationKey, NotificationKind,
    PermissionState, ResolvedEvent, TimingTable,
};
use crate::domain::resolver::{resolve, seconds_until};
use crate::infrastructure::config::AppSettings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::fired_keys::FiredKeyStore;
use crate::infrastructure::notification_sink::{Notification, NotificationOptions, NotificationSink};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::sync::{Arc, Mutex};

/// Seconds after an event during which a late tick still raises its adhan.
const ADHAN_LATE_WINDOW_SECONDS: i64 = 10;
const PRE_REMINDER_SECONDS: i64 = 15 * 60;
const PRE_REMINDER_WINDOW_SECONDS: i64 = 20;
const EVENING_ATHKAR_AFTER_ASR_MINUTES: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryContext {
    pub notifications_enabled: bool,
    pub do_not_disturb: bool,
    pub adhan_sound: AdhanSound,
    pub language: Language,
}

impl DeliveryContext {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            notifications_enabled: settings.app.notifications_enabled,
            do_not_disturb: settings.app.do_not_disturb,
            adhan_sound: settings.app.adhan_sound,
            language: settings.app.language,
        }
    }

    fn audible_sound(&self) -> Option<AdhanSound> {
        if self.do_not_disturb || self.adhan_sound == AdhanSound::None {
            None
        } else {
            Some(self.adhan_sound)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub resolved: ResolvedEvent,
    pub fired: Vec<NotificationKey>,
    /// Something was due but permission was not granted; nothing was recorded.
    pub blocked_by_permission: bool,
}

/// Keys whose capture window contains `now`. Pure; dedup is applied by the caller.
pub fn due_notifications(
    table: &TimingTable,
    resolved: &ResolvedEvent,
    now: NaiveDateTime,
) -> Vec<NotificationKey> {
    let today = now.date();
    let time = now.time();
    let mut due = Vec::new();

    for (event, _) in table.primary_events() {
        let Some(remaining) = seconds_until(table, event, time) else {
            continue;
        };
        if remaining > -ADHAN_LATE_WINDOW_SECONDS && remaining <= 0 {
            due.push(NotificationKey::new(event, NotificationKind::Adhan, today));
        }
    }

    if resolved.remaining_seconds > PRE_REMINDER_SECONDS - PRE_REMINDER_WINDOW_SECONDS
        && resolved.remaining_seconds <= PRE_REMINDER_SECONDS
    {
        let day = if resolved.wraps_to_tomorrow {
            today + Duration::days(1)
        } else {
            today
        };
        due.push(NotificationKey::new(
            resolved.next,
            NotificationKind::PreReminder15m,
            day,
        ));
    }

    // Single-minute windows: a tick delayed past the minute skips the reminder.
    let now_minutes = minutes_of_day(time);
    if now_minutes == table.sunrise_minutes() {
        due.push(NotificationKey::new(
            EventName::Sunrise,
            NotificationKind::MorningAthkar,
            today,
        ));
    }
    if now_minutes == table.asr_minutes() + EVENING_ATHKAR_AFTER_ASR_MINUTES {
        due.push(NotificationKey::new(
            EventName::Asr,
            NotificationKind::EveningAthkar,
            today,
        ));
    }

    due
}

pub fn compose_notification(key: &NotificationKey, context: &DeliveryContext) -> Notification {
    let MessageText { title, body } = match key.kind {
        NotificationKind::Adhan => messages::adhan(context.language, key.event),
        NotificationKind::PreReminder15m => messages::pre_reminder(context.language, key.event),
        NotificationKind::MorningAthkar => messages::morning_athkar(context.language),
        NotificationKind::EveningAthkar => messages::evening_athkar(context.language),
    };
    let sound = match key.kind {
        NotificationKind::Adhan => context.audible_sound(),
        _ => None,
    };
    Notification {
        title,
        body,
        options: NotificationOptions {
            tag: Some(key.to_string()),
            sound,
            ..NotificationOptions::default()
        },
    }
}

/// Per-tick dedup scheduler. Owns the injected fired-key store and rotates it the
/// first time a tick observes a new local date.
pub struct NotificationScheduler {
    fired_keys: Arc<dyn FiredKeyStore>,
    sink: Arc<dyn NotificationSink>,
    current_day: Mutex<Option<NaiveDate>>,
}

impl NotificationScheduler {
    pub fn new(fired_keys: Arc<dyn FiredKeyStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            fired_keys,
            sink,
            current_day: Mutex::new(None),
        }
    }

    pub fn on_tick(
        &self,
        table: &TimingTable,
        now: NaiveDateTime,
        context: &DeliveryContext,
    ) -> Result<TickOutcome, InfraError> {
        let resolved = resolve(table, now.time());
        self.observe_day(now.date())?;

        let mut outcome = TickOutcome {
            resolved,
            fired: Vec::new(),
            blocked_by_permission: false,
        };
        if !context.notifications_enabled {
            return Ok(outcome);
        }

        let due = due_notifications(table, &resolved, now);
        if due.is_empty() {
            return Ok(outcome);
        }
        if self.sink.permission() != PermissionState::Granted {
            tracing::debug!(due = due.len(), "notification permission not granted; skipping delivery");
            outcome.blocked_by_permission = true;
            return Ok(outcome);
        }

        for key in due {
            if !self.fired_keys.mark_if_absent(&key)? {
                continue;
            }
            let notification = compose_notification(&key, context);
            match self.sink.show(&notification) {
                Ok(()) => tracing::info!(key = %key, title = %notification.title, "notification delivered"),
                Err(error) => tracing::warn!(key = %key, %error, "notification delivery failed"),
            }
            outcome.fired.push(key);
        }
        Ok(outcome)
    }

    fn observe_day(&self, today: NaiveDate) -> Result<(), InfraError> {
        let mut current = self
            .current_day
            .lock()
            .map_err(|error| InfraError::lock_poisoned("scheduler day", error))?;
        if *current == Some(today) {
            return Ok(());
        }
        let dropped = self.fired_keys.rotate(today)?;
        tracing::debug!(%today, dropped, "day boundary observed; fired keys rotated");
        *current = Some(today);
        Ok(())
    }
}
