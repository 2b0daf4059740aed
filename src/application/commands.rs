use crate::application::background::{
    BackgroundDelivery, ClickOutcome, LoggingWindowHost, PushOutcome, WindowHost,
};
use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::notification_scheduler::{DeliveryContext, NotificationScheduler};
use crate::application::prayer_times::PrayerTimesService;
use crate::application::tick_loop::{local_now_provider, CountdownState, LocalNowProvider, TickLoop};
use crate::domain::messages;
use crate::domain::models::{
    AdhanSound, CalculationSettings, Coordinates, DayRecord, EventName, HijriDate, Language,
    PermissionState, PrayerOffsets,
};
use crate::infrastructure::config::{
    load_settings, provider_base_url, save_app_config, save_calculation, save_manual_location,
    AppConfig, AppSettings, ManualLocation,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::fired_keys::{FiredKeyStore, SqliteFiredKeyStore};
use crate::infrastructure::geolocation::{
    resolve_coordinates, FixedGeolocation, GeolocationProvider, LocationSource,
};
use crate::infrastructure::kv_store::SqliteKeyValueStore;
use crate::infrastructure::notification_sink::{
    DeliveryRouter, LoggingNotificationSink, Notification, NotificationOptions, NotificationSink,
};
use crate::infrastructure::runtime_cache::{AssetFetcher, ReqwestAssetFetcher, RuntimeCache, Served};
use crate::infrastructure::timetable_client::{ReqwestTimetableClient, TimetableProvider};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Outer collaborators of the core. Production wiring comes from
/// [`Collaborators::from_settings`]; tests substitute fakes.
pub struct Collaborators {
    pub provider: Arc<dyn TimetableProvider>,
    pub geolocation: Arc<dyn GeolocationProvider>,
    pub sink: Arc<dyn NotificationSink>,
    pub windows: Arc<dyn WindowHost>,
    pub asset_fetcher: Arc<dyn AssetFetcher>,
}

impl Collaborators {
    pub fn from_settings(
        settings: &AppSettings,
        device_position: Option<Coordinates>,
    ) -> Result<Self, InfraError> {
        let base_url = provider_base_url(settings, |key| std::env::var(key).ok());
        let foreground = Arc::new(LoggingNotificationSink::new(PermissionState::Default, true));
        Ok(Self {
            provider: Arc::new(ReqwestTimetableClient::new(&base_url)?),
            geolocation: Arc::new(FixedGeolocation::new(device_position)),
            sink: Arc::new(DeliveryRouter::new(foreground)),
            windows: Arc::new(LoggingWindowHost),
            asset_fetcher: Arc::new(ReqwestAssetFetcher::new()),
        })
    }
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    settings: Mutex<AppSettings>,
    prayer_times: PrayerTimesService<dyn TimetableProvider, SqliteKeyValueStore>,
    geolocation: Arc<dyn GeolocationProvider>,
    sink: Arc<dyn NotificationSink>,
    scheduler: Arc<NotificationScheduler>,
    background: BackgroundDelivery,
    runtime_cache: Arc<RuntimeCache<dyn AssetFetcher>>,
    active_day: watch::Sender<Option<DayRecord>>,
    context: watch::Sender<DeliveryContext>,
    countdown: Arc<watch::Sender<CountdownState>>,
    now_provider: LocalNowProvider,
}

impl AppState {
    pub fn new(workspace_root: PathBuf, device_position: Option<Coordinates>) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let collaborators = Collaborators::from_settings(&bootstrap.settings, device_position)?;
        Self::assemble(bootstrap, collaborators)
    }

    pub fn with_collaborators(
        workspace_root: PathBuf,
        collaborators: Collaborators,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Self::assemble(bootstrap, collaborators)
    }

    fn assemble(bootstrap: BootstrapResult, collaborators: Collaborators) -> Result<Self, InfraError> {
        let settings = bootstrap.settings;
        let timezone = settings.timezone()?;
        let fired_keys: Arc<dyn FiredKeyStore> =
            Arc::new(SqliteFiredKeyStore::new(&bootstrap.database_path));
        let scheduler = Arc::new(NotificationScheduler::new(
            Arc::clone(&fired_keys),
            Arc::clone(&collaborators.sink),
        ));
        let background = BackgroundDelivery::new(
            fired_keys,
            Arc::clone(&collaborators.sink),
            collaborators.windows,
        );
        let prayer_times = PrayerTimesService::new(
            collaborators.provider,
            Arc::new(SqliteKeyValueStore::new(&bootstrap.database_path)),
        );
        let (active_day, _) = watch::channel(None);
        let (context, _) = watch::channel(DeliveryContext::from_settings(&settings));
        let (countdown, _) = watch::channel(CountdownState::default());

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            settings: Mutex::new(settings),
            prayer_times,
            geolocation: collaborators.geolocation,
            sink: collaborators.sink,
            scheduler,
            background,
            runtime_cache: Arc::new(RuntimeCache::new(collaborators.asset_fetcher)),
            active_day,
            context,
            countdown: Arc::new(countdown),
            now_provider: local_now_provider(timezone),
        })
    }

    pub fn with_now_provider(mut self, now_provider: LocalNowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.now_provider)()
    }

    pub fn settings(&self) -> Result<AppSettings, InfraError> {
        Ok(lock_settings(self)?.clone())
    }

    pub fn active_day(&self) -> Option<DayRecord> {
        self.active_day.borrow().clone()
    }

    pub fn subscribe_countdown(&self) -> watch::Receiver<CountdownState> {
        self.countdown.subscribe()
    }

    pub fn tick_loop(&self) -> TickLoop {
        TickLoop::new(
            Arc::clone(&self.scheduler),
            self.active_day.subscribe(),
            self.context.subscribe(),
            Arc::clone(&self.countdown),
            Arc::clone(&self.now_provider),
        )
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        tracing::error!(command, offline = error.is_offline(), %error, "command failed");
        error.to_string()
    }

    fn reload_settings(&self) -> Result<AppSettings, InfraError> {
        let settings = load_settings(&self.config_dir)?;
        *lock_settings(self)? = settings.clone();
        self.context
            .send_replace(DeliveryContext::from_settings(&settings));
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub source: LocationSource,
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerTimesResponse {
    pub date: String,
    pub readable: String,
    pub hijri: Option<HijriDate>,
    pub timezone: Option<String>,
    pub timings: BTreeMap<EventName, String>,
    pub location: LocationResponse,
    pub is_today: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub language: Option<Language>,
    pub adhan_sound: Option<AdhanSound>,
    pub notifications_enabled: Option<bool>,
    pub do_not_disturb: Option<bool>,
}

pub async fn resolve_location_impl(state: &AppState) -> Result<LocationResponse, InfraError> {
    let settings = state.settings()?;
    let (coordinates, source) =
        resolve_coordinates(settings.manual_coordinates(), state.geolocation.as_ref()).await;
    let city = match source {
        LocationSource::Manual => settings.location.manual.map(|manual| manual.city),
        LocationSource::Device | LocationSource::Fallback => None,
    };
    Ok(LocationResponse {
        latitude: coordinates.latitude,
        longitude: coordinates.longitude,
        source,
        city,
    })
}

/// Loads the table for `date` (today when absent) and makes it the tick loop's
/// active day. A table for another date leaves the countdown at zero.
pub async fn load_prayer_times_impl(
    state: &AppState,
    date: Option<String>,
) -> Result<PrayerTimesResponse, InfraError> {
    let today = state.now().date();
    let date = match date {
        Some(raw) => parse_date_input(&raw, "date")?,
        None => today,
    };
    let location = resolve_location_impl(state).await?;
    let settings = state.settings()?;
    let coordinates = Coordinates {
        latitude: location.latitude,
        longitude: location.longitude,
    };

    let day = state
        .prayer_times
        .fetch_for_day(&coordinates, date, &settings.calculation)
        .await?;
    state.active_day.send_replace(Some(day.clone()));
    tracing::info!(%date, source = ?location.source, "prayer times loaded");

    Ok(PrayerTimesResponse {
        date: day.gregorian.format("%Y-%m-%d").to_string(),
        readable: day.readable,
        hijri: day.hijri,
        timezone: day.timezone,
        timings: day.timings.into(),
        is_today: day.gregorian == today,
        location,
    })
}

/// Reloads today's table when none is loaded or the loaded one is from another day.
pub async fn refresh_if_stale_impl(state: &AppState) -> Result<bool, InfraError> {
    let today = state.now().date();
    let stale = state
        .active_day()
        .map(|day| day.gregorian != today)
        .unwrap_or(true);
    if !stale {
        return Ok(false);
    }
    load_prayer_times_impl(state, None).await?;
    Ok(true)
}

pub async fn list_cached_month_impl(
    state: &AppState,
    date: Option<String>,
) -> Result<Vec<DayRecord>, InfraError> {
    let date = match date {
        Some(raw) => parse_date_input(&raw, "date")?,
        None => state.now().date(),
    };
    let location = resolve_location_impl(state).await?;
    let settings = state.settings()?;
    state.prayer_times.cached_month(
        &Coordinates {
            latitude: location.latitude,
            longitude: location.longitude,
        },
        date,
        &settings.calculation,
    )
}

pub fn current_countdown_impl(state: &AppState) -> CountdownState {
    state.countdown.borrow().clone()
}

/// Asks the host only while the permission is still `default`. A fresh grant
/// enables notifications and shows a confirmation.
pub fn request_notification_permission_impl(state: &AppState) -> Result<PermissionState, InfraError> {
    let before = state.sink.permission();
    if before != PermissionState::Default {
        return Ok(before);
    }

    let after = state.sink.request_permission()?;
    tracing::info!(?after, "notification permission requested");
    if after != PermissionState::Granted {
        return Ok(after);
    }

    let mut app = state.settings()?.app;
    if !app.notifications_enabled {
        app.notifications_enabled = true;
        save_app_config(state.config_dir(), &app)?;
        state.reload_settings()?;
    }
    let text = messages::notifications_enabled(app.language);
    state.sink.show(&Notification {
        title: text.title,
        body: text.body,
        options: NotificationOptions::default(),
    })?;
    Ok(after)
}

pub async fn set_manual_location_impl(
    state: &AppState,
    latitude: f64,
    longitude: f64,
    city: String,
) -> Result<LocationResponse, InfraError> {
    save_manual_location(
        state.config_dir(),
        &ManualLocation {
            latitude,
            longitude,
            city,
        },
    )?;
    state.reload_settings()?;
    reload_active_day(state).await;
    resolve_location_impl(state).await
}

pub async fn set_calculation_impl(
    state: &AppState,
    method: u32,
    madhab: u8,
    offsets: Option<PrayerOffsets>,
) -> Result<CalculationSettings, InfraError> {
    let calculation = CalculationSettings {
        method,
        madhab,
        offsets: offsets.unwrap_or_default(),
    };
    save_calculation(state.config_dir(), &calculation)?;
    let settings = state.reload_settings()?;
    reload_active_day(state).await;
    Ok(settings.calculation)
}

pub fn update_preferences_impl(
    state: &AppState,
    update: PreferencesUpdate,
) -> Result<AppConfig, InfraError> {
    let mut app = state.settings()?.app;
    let was_enabled = app.notifications_enabled;
    if let Some(language) = update.language {
        app.language = language;
    }
    if let Some(adhan_sound) = update.adhan_sound {
        app.adhan_sound = adhan_sound;
    }
    if let Some(enabled) = update.notifications_enabled {
        app.notifications_enabled = enabled;
    }
    if let Some(do_not_disturb) = update.do_not_disturb {
        app.do_not_disturb = do_not_disturb;
    }
    save_app_config(state.config_dir(), &app)?;
    state.reload_settings()?;

    if app.notifications_enabled && !was_enabled {
        if let Err(error) = request_notification_permission_impl(state) {
            tracing::warn!(%error, "permission request after enabling notifications failed");
        }
    }
    Ok(state.settings()?.app)
}

pub fn handle_push_impl(state: &AppState, payload: Option<String>) -> Result<PushOutcome, InfraError> {
    state.background.handle_push(payload.as_deref())
}

pub fn handle_notification_click_impl(
    state: &AppState,
    notification: &Notification,
) -> Result<ClickOutcome, InfraError> {
    state.background.handle_click(notification)
}

pub async fn fetch_asset_impl(state: &AppState, url: String) -> Result<Served, InfraError> {
    state.runtime_cache.handle(&url).await
}

async fn reload_active_day(state: &AppState) {
    let Some(day) = state.active_day() else {
        return;
    };
    let date = day.gregorian.format("%Y-%m-%d").to_string();
    if let Err(error) = load_prayer_times_impl(state, Some(date)).await {
        tracing::warn!(%error, "settings changed but the active day could not be reloaded");
        state.active_day.send_replace(None);
    }
}

fn lock_settings(state: &AppState) -> Result<MutexGuard<'_, AppSettings>, InfraError> {
    state
        .settings
        .lock()
        .map_err(|error| InfraError::lock_poisoned("settings", error))
}

fn parse_date_input(value: &str, field_name: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|error| {
        InfraError::InvalidConfig(format!("{field_name} must be YYYY-MM-DD: {error}"))
    })
}
