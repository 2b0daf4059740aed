use crate::domain::models::{
    CalculationSettings, Coordinates, DayRecord, EventName, HijriDate, TimingTable,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct MonthRequest {
    pub coordinates: Coordinates,
    pub month: u32,
    pub year: i32,
    pub settings: CalculationSettings,
}

/// External time-table provider returning one [`DayRecord`] per day of a month.
#[async_trait]
pub trait TimetableProvider: Send + Sync {
    async fn fetch_month(&self, request: &MonthRequest) -> Result<Vec<DayRecord>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTimetableClient {
    client: Client,
    base_url: Url,
}

impl ReqwestTimetableClient {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid provider base url '{base_url}': {error}"))
        })?;
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    pub(crate) fn calendar_endpoint(&self, request: &MonthRequest) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("provider base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("calendar");
            segments.push(&request.year.to_string());
            segments.push(&request.month.to_string());
        }
        url.query_pairs_mut()
            .append_pair("latitude", &request.coordinates.latitude.to_string())
            .append_pair("longitude", &request.coordinates.longitude.to_string())
            .append_pair("method", &request.settings.method.to_string())
            .append_pair("school", &request.settings.madhab.to_string())
            .append_pair("tune", &request.settings.offsets.tune_parameter());
        Ok(url)
    }
}

#[derive(Debug, serde::Deserialize)]
struct CalendarResponse {
    code: Option<u16>,
    data: Option<Vec<ProviderDay>>,
}

#[derive(Debug, serde::Deserialize)]
struct ProviderDay {
    timings: HashMap<String, String>,
    date: ProviderDate,
    meta: Option<ProviderMeta>,
}

#[derive(Debug, serde::Deserialize)]
struct ProviderDate {
    readable: Option<String>,
    gregorian: ProviderGregorian,
    hijri: Option<ProviderHijri>,
}

#[derive(Debug, serde::Deserialize)]
struct ProviderGregorian {
    date: String,
}

#[derive(Debug, serde::Deserialize)]
struct ProviderHijri {
    date: String,
    day: String,
    month: ProviderHijriMonth,
    year: String,
}

#[derive(Debug, serde::Deserialize)]
struct ProviderHijriMonth {
    number: u32,
    en: String,
    ar: String,
}

#[derive(Debug, serde::Deserialize)]
struct ProviderMeta {
    timezone: Option<String>,
}

fn map_day(day: ProviderDay) -> Result<DayRecord, InfraError> {
    let gregorian = NaiveDate::parse_from_str(day.date.gregorian.date.trim(), "%d-%m-%Y")
        .map_err(|error| {
            InfraError::MalformedTable(format!(
                "invalid gregorian date '{}': {error}",
                day.date.gregorian.date
            ))
        })?;

    let entries = day
        .timings
        .iter()
        .filter_map(|(name, raw)| name.parse::<EventName>().ok().map(|event| (event, raw.as_str())));
    let timings = TimingTable::from_entries(entries)
        .map_err(|message| InfraError::MalformedTable(format!("{gregorian}: {message}")))?;

    let hijri = day.date.hijri.and_then(|hijri| {
        Some(HijriDate {
            date: hijri.date,
            day: hijri.day.trim().parse().ok()?,
            month_number: hijri.month.number,
            month_en: hijri.month.en,
            month_ar: hijri.month.ar,
            year: hijri.year.trim().parse().ok()?,
        })
    });

    Ok(DayRecord {
        gregorian,
        readable: day
            .date
            .readable
            .unwrap_or_else(|| gregorian.format("%d %b %Y").to_string()),
        hijri,
        timezone: day.meta.and_then(|meta| meta.timezone),
        timings,
    })
}

pub(crate) fn parse_calendar_payload(body: &str) -> Result<Vec<DayRecord>, InfraError> {
    let parsed: CalendarResponse = serde_json::from_str(body)
        .map_err(|error| InfraError::MalformedTable(format!("invalid calendar payload: {error}")))?;
    if let Some(code) = parsed.code.filter(|code| *code != 200) {
        return Err(InfraError::Http(format!("provider returned code {code}")));
    }
    let days = parsed
        .data
        .filter(|days| !days.is_empty())
        .ok_or_else(|| InfraError::MalformedTable("calendar payload has no days".to_string()))?;
    days.into_iter().map(map_day).collect()
}

#[async_trait]
impl TimetableProvider for ReqwestTimetableClient {
    async fn fetch_month(&self, request: &MonthRequest) -> Result<Vec<DayRecord>, InfraError> {
        let endpoint = self.calendar_endpoint(request)?;
        tracing::debug!(%endpoint, "fetching monthly time-table");

        let response = self.client.get(endpoint).send().await.map_err(|error| {
            InfraError::Http(format!("network error while fetching time-table: {error}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Http(format!("network error while reading time-table response: {error}"))
        })?;

        if !status.is_success() {
            return Err(InfraError::Http(format!(
                "time-table provider error: http {}",
                status.as_u16()
            )));
        }

        parse_calendar_payload(&body)
    }
}
