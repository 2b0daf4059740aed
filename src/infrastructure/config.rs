use crate::domain::models::{AdhanSound, CalculationSettings, Coordinates, Language};
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const LOCATION_JSON: &str = "location.json";
const CALCULATION_JSON: &str = "calculation.json";
pub const DEFAULT_PROVIDER_URL: &str = "https://api.aladhan.com/v1";
pub const PROVIDER_URL_ENV: &str = "MAWAQIT_PROVIDER_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub app_name: String,
    pub timezone: String,
    pub language: Language,
    pub adhan_sound: AdhanSound,
    pub notifications_enabled: bool,
    #[serde(default)]
    pub do_not_disturb: bool,
    #[serde(default = "default_provider_url")]
    pub provider_base_url: String,
}

fn default_provider_url() -> String {
    DEFAULT_PROVIDER_URL.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
}

impl ManualLocation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    pub mode: LocationMode,
    #[serde(default)]
    pub manual: Option<ManualLocation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    pub app: AppConfig,
    pub location: LocationConfig,
    pub calculation: CalculationSettings,
}

impl AppSettings {
    pub fn timezone(&self) -> Result<Tz, InfraError> {
        self.app.timezone.trim().parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("invalid timezone '{}': {error}", self.app.timezone))
        })
    }

    pub fn manual_coordinates(&self) -> Option<Coordinates> {
        match self.location.mode {
            LocationMode::Manual => self.location.manual.as_ref().map(ManualLocation::coordinates),
            LocationMode::Auto => None,
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Mawaqit",
                "timezone": "UTC",
                "language": "ar",
                "adhanSound": "makkah",
                "notificationsEnabled": true,
                "doNotDisturb": false,
                "providerBaseUrl": DEFAULT_PROVIDER_URL
            }),
        ),
        (
            LOCATION_JSON,
            serde_json::json!({
                "schema": 1,
                "mode": "auto",
                "manual": null
            }),
        ),
        (
            CALCULATION_JSON,
            serde_json::json!({
                "schema": 1,
                "method": 4,
                "madhab": 0,
                "offsets": {
                    "Fajr": 0,
                    "Sunrise": 0,
                    "Dhuhr": 0,
                    "Asr": 0,
                    "Maghrib": 0,
                    "Isha": 0
                }
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            write_config(&path, &value)?;
        }
    }
    Ok(())
}

fn write_config(path: &Path, value: &serde_json::Value) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_typed<T>(path: &Path) -> Result<T, InfraError>
where
    T: for<'de> Deserialize<'de>,
{
    let value = read_config(path)?;
    serde_json::from_value(value).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid structure in {}: {error}", path.display()))
    })
}

pub fn load_settings(config_dir: &Path) -> Result<AppSettings, InfraError> {
    let app: AppConfig = read_typed(&config_dir.join(APP_JSON))?;
    let location: LocationConfig = read_typed(&config_dir.join(LOCATION_JSON))?;
    let calculation: CalculationSettings = read_typed(&config_dir.join(CALCULATION_JSON))?;

    calculation.validate().map_err(InfraError::InvalidConfig)?;
    if let Some(manual) = location.manual.as_ref() {
        manual.coordinates().validate().map_err(InfraError::InvalidConfig)?;
    }
    if location.mode == LocationMode::Manual && location.manual.is_none() {
        return Err(InfraError::InvalidConfig(
            "location.manual is required when mode is manual".to_string(),
        ));
    }

    let settings = AppSettings {
        app,
        location,
        calculation,
    };
    settings.timezone()?;
    Ok(settings)
}

pub fn save_calculation(config_dir: &Path, calculation: &CalculationSettings) -> Result<(), InfraError> {
    calculation.validate().map_err(InfraError::InvalidConfig)?;
    let mut value = serde_json::to_value(calculation)?;
    let object = value.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig("calculation settings must serialize to an object".to_string())
    })?;
    object.insert("schema".to_string(), serde_json::json!(1));
    write_config(&config_dir.join(CALCULATION_JSON), &value)
}

pub fn save_app_config(config_dir: &Path, app: &AppConfig) -> Result<(), InfraError> {
    app.timezone.trim().parse::<Tz>().map_err(|error| {
        InfraError::InvalidConfig(format!("invalid timezone '{}': {error}", app.timezone))
    })?;
    let mut value = serde_json::to_value(app)?;
    let object = value.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig("app config must serialize to an object".to_string())
    })?;
    object.insert("schema".to_string(), serde_json::json!(1));
    write_config(&config_dir.join(APP_JSON), &value)
}

pub fn save_manual_location(config_dir: &Path, location: &ManualLocation) -> Result<(), InfraError> {
    location.coordinates().validate().map_err(InfraError::InvalidConfig)?;
    let city = location.city.trim();
    if city.is_empty() {
        return Err(InfraError::InvalidConfig(
            "location.manual.city must not be empty".to_string(),
        ));
    }

    let path = config_dir.join(LOCATION_JSON);
    let mut config = read_config(&path)?;
    let object = config.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    object.insert("mode".to_string(), serde_json::json!("manual"));
    object.insert(
        "manual".to_string(),
        serde_json::json!({
            "latitude": location.latitude,
            "longitude": location.longitude,
            "city": city,
        }),
    );
    write_config(&path, &config)
}

pub fn provider_base_url<F>(settings: &AppSettings, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(PROVIDER_URL_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| settings.app.provider_base_url.trim().to_string())
}
