use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const MINUTES_PER_DAY: i64 = 24 * 60;
pub const FALLBACK_COORDINATES: Coordinates = Coordinates {
    latitude: 21.4225,
    longitude: 39.8262,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventName {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Sunset,
    Maghrib,
    Isha,
    Imsak,
    Midnight,
}

impl EventName {
    /// Canonical scan order of the six daily prayer moments.
    pub const PRIMARY: [EventName; 6] = [
        EventName::Fajr,
        EventName::Sunrise,
        EventName::Dhuhr,
        EventName::Asr,
        EventName::Maghrib,
        EventName::Isha,
    ];
    pub const AUXILIARY: [EventName; 3] = [EventName::Sunset, EventName::Imsak, EventName::Midnight];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fajr => "Fajr",
            Self::Sunrise => "Sunrise",
            Self::Dhuhr => "Dhuhr",
            Self::Asr => "Asr",
            Self::Sunset => "Sunset",
            Self::Maghrib => "Maghrib",
            Self::Isha => "Isha",
            Self::Imsak => "Imsak",
            Self::Midnight => "Midnight",
        }
    }

    fn primary_index(self) -> Option<usize> {
        Self::PRIMARY.iter().position(|candidate| *candidate == self)
    }

    pub fn is_primary(self) -> bool {
        self.primary_index().is_some()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::PRIMARY
            .iter()
            .chain(Self::AUXILIARY.iter())
            .copied()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown event name '{value}'"))
    }
}

/// One day's event times as minutes since local midnight.
///
/// Construction requires all six primary events; auxiliary markers are optional.
/// Ordering between events is the provider's guarantee and is not checked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<EventName, String>",
    into = "BTreeMap<EventName, String>"
)]
pub struct TimingTable {
    primary: [i64; 6],
    auxiliary: BTreeMap<EventName, i64>,
}

impl TimingTable {
    pub fn from_entries<'a, I>(entries: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (EventName, &'a str)>,
    {
        let mut primary: [Option<i64>; 6] = [None; 6];
        let mut auxiliary = BTreeMap::new();

        for (event, raw) in entries {
            let minutes = parse_hhmm_minutes(raw)
                .ok_or_else(|| format!("timings.{event} must be HH:mm, got '{raw}'"))?;
            match event.primary_index() {
                Some(index) => primary[index] = Some(minutes),
                None => {
                    auxiliary.insert(event, minutes);
                }
            }
        }

        let mut resolved = [0_i64; 6];
        for (index, slot) in primary.into_iter().enumerate() {
            resolved[index] = slot.ok_or_else(|| {
                format!("timings.{} is missing", EventName::PRIMARY[index])
            })?;
        }

        Ok(Self {
            primary: resolved,
            auxiliary,
        })
    }

    pub fn minutes(&self, event: EventName) -> Option<i64> {
        match event.primary_index() {
            Some(index) => Some(self.primary[index]),
            None => self.auxiliary.get(&event).copied(),
        }
    }

    pub fn primary_events(&self) -> impl Iterator<Item = (EventName, i64)> + '_ {
        EventName::PRIMARY
            .iter()
            .copied()
            .zip(self.primary.iter().copied())
    }

    pub fn fajr_minutes(&self) -> i64 {
        self.primary[0]
    }

    pub fn sunrise_minutes(&self) -> i64 {
        self.primary[1]
    }

    pub fn asr_minutes(&self) -> i64 {
        self.primary[3]
    }

    pub fn time_of(&self, event: EventName) -> Option<String> {
        self.minutes(event).map(format_hhmm)
    }
}

impl TryFrom<BTreeMap<EventName, String>> for TimingTable {
    type Error = String;

    fn try_from(value: BTreeMap<EventName, String>) -> Result<Self, Self::Error> {
        Self::from_entries(value.iter().map(|(event, raw)| (*event, raw.as_str())))
    }
}

impl From<TimingTable> for BTreeMap<EventName, String> {
    fn from(value: TimingTable) -> Self {
        value
            .primary_events()
            .chain(value.auxiliary.iter().map(|(event, minutes)| (*event, *minutes)))
            .map(|(event, minutes)| (event, format_hhmm(minutes)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedEvent {
    pub next: EventName,
    pub remaining_seconds: i64,
    /// Set when every event of today has passed and `next` is tomorrow's Fajr.
    pub wraps_to_tomorrow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HijriDate {
    pub date: String,
    pub day: u32,
    pub month_number: u32,
    pub month_en: String,
    pub month_ar: String,
    pub year: i32,
}

/// A provider day: the timing table plus its calendar metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub gregorian: NaiveDate,
    pub readable: String,
    pub hijri: Option<HijriDate>,
    pub timezone: Option<String>,
    pub timings: TimingTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn validate(&self) -> Result<(), String> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err("coordinates.latitude must be within [-90, 90]".to_string());
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err("coordinates.longitude must be within [-180, 180]".to_string());
        }
        Ok(())
    }

    pub fn latitude_hundredths(&self) -> i64 {
        (self.latitude * 100.0).round() as i64
    }

    pub fn longitude_hundredths(&self) -> i64 {
        (self.longitude * 100.0).round() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrayerOffsets {
    #[serde(rename = "Fajr")]
    pub fajr: i32,
    #[serde(rename = "Sunrise")]
    pub sunrise: i32,
    #[serde(rename = "Dhuhr")]
    pub dhuhr: i32,
    #[serde(rename = "Asr")]
    pub asr: i32,
    #[serde(rename = "Maghrib")]
    pub maghrib: i32,
    #[serde(rename = "Isha")]
    pub isha: i32,
}

impl PrayerOffsets {
    /// Nine-slot `tune` parameter: Imsak, Fajr, Sunrise, Dhuhr, Asr, Sunset, Maghrib, Isha, Midnight.
    pub fn tune_parameter(&self) -> String {
        format!(
            "0,{},{},{},{},0,{},{},0",
            self.fajr, self.sunrise, self.dhuhr, self.asr, self.maghrib, self.isha
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationSettings {
    pub method: u32,
    pub madhab: u8,
    #[serde(default)]
    pub offsets: PrayerOffsets,
}

impl Default for CalculationSettings {
    fn default() -> Self {
        Self {
            method: 4,
            madhab: 0,
            offsets: PrayerOffsets::default(),
        }
    }
}

impl CalculationSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.madhab > 1 {
            return Err("calculation.madhab must be 0 or 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    Adhan,
    #[serde(rename = "pre-reminder-15m")]
    PreReminder15m,
    MorningAthkar,
    EveningAthkar,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::Adhan,
        NotificationKind::PreReminder15m,
        NotificationKind::MorningAthkar,
        NotificationKind::EveningAthkar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Adhan => "adhan",
            Self::PreReminder15m => "pre-reminder-15m",
            Self::MorningAthkar => "morning-athkar",
            Self::EveningAthkar => "evening-athkar",
        }
    }
}

/// Dedup identity of one logical notification: `{event}-{kind}-{YYYY-MM-DD}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub event: EventName,
    pub kind: NotificationKind,
    pub day: NaiveDate,
}

impl NotificationKey {
    pub fn new(event: EventName, kind: NotificationKind, day: NaiveDate) -> Self {
        Self { event, kind, day }
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.event,
            self.kind.as_str(),
            self.day.format("%Y-%m-%d")
        )
    }
}

impl FromStr for NotificationKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid notification key '{value}'");
        let value = value.trim();
        let (event_raw, rest) = value.split_once('-').ok_or_else(invalid)?;
        if rest.len() < 12 || !rest.is_char_boundary(rest.len() - 10) {
            return Err(invalid());
        }
        let (kind_raw, day_raw) = rest.split_at(rest.len() - 10);
        let kind_raw = kind_raw.strip_suffix('-').ok_or_else(invalid)?;

        let event = event_raw.parse::<EventName>()?;
        let kind = NotificationKind::ALL
            .iter()
            .copied()
            .find(|candidate| candidate.as_str() == kind_raw)
            .ok_or_else(invalid)?;
        let day = NaiveDate::parse_from_str(day_raw, "%Y-%m-%d").map_err(|_| invalid())?;
        Ok(Self { event, kind, day })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdhanSound {
    Makkah,
    Madina,
    Alaqsa,
    Beep,
    None,
}

impl AdhanSound {
    pub fn audio_url(self) -> Option<&'static str> {
        match self {
            Self::Makkah => Some("https://www.islamcan.com/audio/adhan/azan1.mp3"),
            Self::Madina => Some("https://www.islamcan.com/audio/adhan/azan2.mp3"),
            Self::Alaqsa => Some("https://www.islamcan.com/audio/adhan/azan3.mp3"),
            Self::Beep => Some("https://actions.google.com/sounds/v1/alarms/beep_short.ogg"),
            Self::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Ar,
    En,
    Fr,
}

pub fn minutes_of_day(time: NaiveTime) -> i64 {
    i64::from(time.hour()) * 60 + i64::from(time.minute())
}

/// Accepts provider strings such as `"05:00"` or `"05:00 (+03)"`.
pub fn parse_hhmm_minutes(value: &str) -> Option<i64> {
    let clean = value.split_whitespace().next()?;
    let (hour_raw, minute_raw) = clean.split_once(':')?;
    let hour = hour_raw.parse::<u8>().ok()?;
    let minute = minute_raw.parse::<u8>().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(i64::from(hour) * 60 + i64::from(minute))
}

pub fn format_hhmm(minutes: i64) -> String {
    let minutes = minutes.rem_euclid(MINUTES_PER_DAY);
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn format_duration(total_seconds: i64) -> String {
    if total_seconds < 0 {
        return "00:00:00".to_string();
    }
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
