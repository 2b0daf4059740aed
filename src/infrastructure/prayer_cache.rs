use crate::domain::models::{CalculationSettings, Coordinates, DayRecord};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::KeyValueStore;
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::sync::Arc;

const CACHE_KEY_PREFIX: &str = "mawaqit_cache";

/// Composite cache line identity. Coordinates are kept in hundredths of a degree so
/// requests within the same 0.01° cell share one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub latitude_hundredths: i64,
    pub longitude_hundredths: i64,
    pub month: u32,
    pub year: i32,
    pub method: u32,
    pub madhab: u8,
}

impl CacheKey {
    /// Coordinates are rounded half away from zero to two decimals, so the key text
    /// matches a fixed two-decimal rendering (`21.4251` and `21.4349` both land on
    /// `21.43`, while `21.4249` stays on `21.42`).
    pub fn derive(coords: &Coordinates, date: NaiveDate, settings: &CalculationSettings) -> Self {
        Self {
            latitude_hundredths: coords.latitude_hundredths(),
            longitude_hundredths: coords.longitude_hundredths(),
            month: date.month(),
            year: date.year(),
            method: settings.method,
            madhab: settings.madhab,
        }
    }
}

fn format_hundredths(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    format!("{sign}{}.{:02}", magnitude / 100, magnitude % 100)
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{CACHE_KEY_PREFIX}_{}_{}_{}_{}_{}_{}",
            format_hundredths(self.latitude_hundredths),
            format_hundredths(self.longitude_hundredths),
            self.month,
            self.year,
            self.method,
            self.madhab
        )
    }
}

/// Month tables keyed by [`CacheKey`], serialized as JSON into a [`KeyValueStore`].
///
/// Entries never expire; moving location, crossing a month or changing the
/// calculation method produces a different key.
pub struct PrayerCache<S>
where
    S: KeyValueStore,
{
    store: Arc<S>,
}

impl<S> Clone for PrayerCache<S>
where
    S: KeyValueStore,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> PrayerCache<S>
where
    S: KeyValueStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<Vec<DayRecord>>, InfraError> {
        let storage_key = key.to_string();
        let Some(raw) = self.store.get(&storage_key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Vec<DayRecord>>(&raw) {
            Ok(days) if !days.is_empty() => Ok(Some(days)),
            Ok(_) => Ok(None),
            Err(error) => {
                tracing::warn!(cache_key = %storage_key, %error, "discarding unreadable cache line");
                Ok(None)
            }
        }
    }

    pub fn put(&self, key: &CacheKey, days: &[DayRecord]) -> Result<(), InfraError> {
        let payload = serde_json::to_string(days)?;
        self.store.set(&key.to_string(), &payload)
    }

    pub fn get_day(&self, key: &CacheKey, date: NaiveDate) -> Result<Option<DayRecord>, InfraError> {
        Ok(self
            .get(key)?
            .and_then(|days| find_day(&days, date).cloned()))
    }
}

pub fn find_day(days: &[DayRecord], date: NaiveDate) -> Option<&DayRecord> {
    days.iter().find(|day| day.gregorian == date)
}
