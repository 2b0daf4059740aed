use crate::domain::models::{CalculationSettings, Coordinates, DayRecord};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::KeyValueStore;
use crate::infrastructure::prayer_cache::{find_day, CacheKey, PrayerCache};
use crate::infrastructure::timetable_client::{MonthRequest, TimetableProvider};
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tokio::time::{sleep, Duration as TokioDuration};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

/// Cache-first day lookup backed by whole-month provider fetches.
pub struct PrayerTimesService<P, S>
where
    P: TimetableProvider + ?Sized,
    S: KeyValueStore,
{
    provider: Arc<P>,
    cache: PrayerCache<S>,
    retry_policy: RetryPolicy,
}

impl<P, S> PrayerTimesService<P, S>
where
    P: TimetableProvider + ?Sized,
    S: KeyValueStore,
{
    pub fn new(provider: Arc<P>, store: Arc<S>) -> Self {
        Self {
            provider,
            cache: PrayerCache::new(store),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Returns the table for `date`. A cached month holding that exact day answers
    /// without any network call; otherwise the whole month is fetched and stored. A failed fetch with nothing cached
    /// surfaces as [`InfraError::ProviderUnavailable`].
    pub async fn fetch_for_day(
        &self,
        coords: &Coordinates,
        date: NaiveDate,
        settings: &CalculationSettings,
    ) -> Result<DayRecord, InfraError> {
        let key = CacheKey::derive(coords, date, settings);

        if let Some(days) = self.read_cache(&key) {
            if let Some(day) = find_day(&days, date) {
                tracing::debug!(cache_key = %key, %date, "prayer times served from cache");
                return Ok(day.clone());
            }
            tracing::debug!(cache_key = %key, %date, "cached month lacks the day; refetching");
        }

        let request = MonthRequest {
            coordinates: *coords,
            month: date.month(),
            year: date.year(),
            settings: *settings,
        };
        let days = match self.fetch_month_with_retry(&request).await {
            Ok(days) => days,
            Err(error) => {
                tracing::warn!(cache_key = %key, %error, "time-table fetch failed with no cached month");
                return Err(InfraError::ProviderUnavailable {
                    cache_key: key.to_string(),
                    reason: error.to_string(),
                });
            }
        };

        if let Err(error) = self.cache.put(&key, &days) {
            tracing::warn!(cache_key = %key, %error, "failed to persist fetched month");
        }

        pick_day(&days, date).ok_or_else(|| {
            InfraError::MalformedTable(format!("provider returned an empty month for {key}"))
        })
    }

    /// Cached month for the calendar view; never touches the network.
    pub fn cached_month(
        &self,
        coords: &Coordinates,
        date: NaiveDate,
        settings: &CalculationSettings,
    ) -> Result<Vec<DayRecord>, InfraError> {
        let key = CacheKey::derive(coords, date, settings);
        Ok(self.cache.get(&key)?.unwrap_or_default())
    }

    fn read_cache(&self, key: &CacheKey) -> Option<Vec<DayRecord>> {
        match self.cache.get(key) {
            Ok(days) => days,
            Err(error) => {
                tracing::warn!(cache_key = %key, %error, "cache read failed; treating as miss");
                None
            }
        }
    }

    async fn fetch_month_with_retry(
        &self,
        request: &MonthRequest,
    ) -> Result<Vec<DayRecord>, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self.provider.fetch_month(request).await {
                Ok(days) => return Ok(days),
                Err(error) if should_retry(&error) && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    tracing::debug!(attempt, delay_ms = delay, %error, "retrying time-table fetch");
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Exact date match, else the month's first day.
fn pick_day(days: &[DayRecord], date: NaiveDate) -> Option<DayRecord> {
    find_day(days, date).or_else(|| days.first()).cloned()
}

fn should_retry(error: &InfraError) -> bool {
    match error {
        InfraError::Http(message) => {
            let message = message.to_ascii_lowercase();
            message.contains("network error")
                || message.contains("timeout")
                || message.contains("timed out")
                || message.contains("connection reset")
                || message.contains("http 503")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::kv_store::InMemoryKeyValueStore;
    use crate::infrastructure::prayer_cache::tests::month_of_days;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    enum FakeResponse {
        Month(Vec<DayRecord>),
        NetworkError,
        Malformed,
    }

    #[derive(Debug, Default)]
    struct FakeProvider {
        responses: Mutex<VecDeque<FakeResponse>>,
        requests: Mutex<Vec<MonthRequest>>,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn with_responses(responses: Vec<FakeResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TimetableProvider for FakeProvider {
        async fn fetch_month(&self, request: &MonthRequest) -> Result<Vec<DayRecord>, InfraError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().expect("requests lock").push(request.clone());
            let next = self
                .responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or(FakeResponse::NetworkError);
            match next {
                FakeResponse::Month(days) => Ok(days),
                FakeResponse::NetworkError => Err(InfraError::Http(
                    "network error while fetching time-table: connection refused".to_string(),
                )),
                FakeResponse::Malformed => {
                    Err(InfraError::MalformedTable("missing Isha".to_string()))
                }
            }
        }
    }

    fn makkah() -> Coordinates {
        Coordinates {
            latitude: 21.4225,
            longitude: 39.8262,
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn fast_retry(max_attempts: u8) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
        }
    }

    fn service(
        provider: Arc<FakeProvider>,
        store: Arc<InMemoryKeyValueStore>,
    ) -> PrayerTimesService<FakeProvider, InMemoryKeyValueStore> {
        PrayerTimesService::new(provider, store).with_retry_policy(fast_retry(3))
    }

    #[tokio::test]
    async fn offline_hit_serves_cached_day_and_miss_is_provider_unavailable() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let settings = CalculationSettings::default();
        PrayerCache::new(Arc::clone(&store))
            .put(
                &CacheKey::derive(&makkah(), date(2024, 3, 1), &settings),
                &month_of_days(2024, 3, 31),
            )
            .expect("seed cache");
        let provider = Arc::new(FakeProvider::default());
        let service = PrayerTimesService::new(Arc::clone(&provider), store)
            .with_retry_policy(fast_retry(1));

        let day = service
            .fetch_for_day(&makkah(), date(2024, 3, 15), &settings)
            .await
            .expect("cached day");
        assert_eq!(day.gregorian, date(2024, 3, 15));
        assert_eq!(provider.calls(), 0);

        let error = service
            .fetch_for_day(&makkah(), date(2024, 4, 2), &settings)
            .await
            .expect_err("april is not cached");
        assert!(error.is_offline());
        match error {
            InfraError::ProviderUnavailable { cache_key, .. } => {
                assert_eq!(cache_key, "mawaqit_cache_21.42_39.83_4_2024_4_0");
            }
            other => panic!("expected provider unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn miss_fetches_whole_month_once() {
        let provider = Arc::new(FakeProvider::with_responses(vec![FakeResponse::Month(
            month_of_days(2024, 3, 31),
        )]));
        let service = service(Arc::clone(&provider), Arc::new(InMemoryKeyValueStore::default()));
        let settings = CalculationSettings::default();

        let first = service
            .fetch_for_day(&makkah(), date(2024, 3, 10), &settings)
            .await
            .expect("fetched day");
        let second = service
            .fetch_for_day(&makkah(), date(2024, 3, 11), &settings)
            .await
            .expect("cached day");

        assert_eq!(first.gregorian, date(2024, 3, 10));
        assert_eq!(second.gregorian, date(2024, 3, 11));
        assert_eq!(provider.calls(), 1);
        let requests = provider.requests.lock().expect("requests lock");
        assert_eq!((requests[0].month, requests[0].year), (3, 2024));
        drop(requests);
        assert_eq!(
            service
                .cached_month(&makkah(), date(2024, 3, 1), &settings)
                .expect("cached month")
                .len(),
            31
        );
    }

    #[tokio::test]
    async fn missing_exact_day_falls_back_to_first_day() {
        let provider = Arc::new(FakeProvider::with_responses(vec![FakeResponse::Month(
            month_of_days(2024, 3, 3),
        )]));
        let service = service(provider, Arc::new(InMemoryKeyValueStore::default()));

        let day = service
            .fetch_for_day(&makkah(), date(2024, 3, 20), &CalculationSettings::default())
            .await
            .expect("fallback day");
        assert_eq!(day.gregorian, date(2024, 3, 1));
    }

    #[tokio::test]
    async fn partial_cached_month_refetches_missing_day() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let settings = CalculationSettings::default();
        PrayerCache::new(Arc::clone(&store))
            .put(
                &CacheKey::derive(&makkah(), date(2024, 3, 1), &settings),
                &month_of_days(2024, 3, 3),
            )
            .expect("seed cache");
        let provider = Arc::new(FakeProvider::with_responses(vec![FakeResponse::Month(
            month_of_days(2024, 3, 31),
        )]));
        let service = service(Arc::clone(&provider), store);

        let day = service
            .fetch_for_day(&makkah(), date(2024, 3, 20), &settings)
            .await
            .expect("refetched day");
        assert_eq!(day.gregorian, date(2024, 3, 20));
        assert_eq!(provider.calls(), 1);
        assert_eq!(
            service
                .cached_month(&makkah(), date(2024, 3, 1), &settings)
                .expect("cached month")
                .len(),
            31
        );
    }

    #[tokio::test]
    async fn partial_cached_month_offline_is_provider_unavailable() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let settings = CalculationSettings::default();
        PrayerCache::new(Arc::clone(&store))
            .put(
                &CacheKey::derive(&makkah(), date(2024, 3, 1), &settings),
                &month_of_days(2024, 3, 3),
            )
            .expect("seed cache");
        let provider = Arc::new(FakeProvider::default());
        let service = PrayerTimesService::new(Arc::clone(&provider), store)
            .with_retry_policy(fast_retry(1));

        let error = service
            .fetch_for_day(&makkah(), date(2024, 3, 20), &settings)
            .await
            .expect_err("day 20 is neither cached nor reachable");
        assert!(error.is_offline());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn transient_network_error_is_retried() {
        let provider = Arc::new(FakeProvider::with_responses(vec![
            FakeResponse::NetworkError,
            FakeResponse::Month(month_of_days(2024, 3, 31)),
        ]));
        let service = service(Arc::clone(&provider), Arc::new(InMemoryKeyValueStore::default()));

        service
            .fetch_for_day(&makkah(), date(2024, 3, 5), &CalculationSettings::default())
            .await
            .expect("second attempt succeeds");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn malformed_payload_is_not_retried() {
        let provider = Arc::new(FakeProvider::with_responses(vec![FakeResponse::Malformed]));
        let service = service(Arc::clone(&provider), Arc::new(InMemoryKeyValueStore::default()));

        let error = service
            .fetch_for_day(&makkah(), date(2024, 3, 5), &CalculationSettings::default())
            .await
            .expect_err("malformed month");
        assert!(error.is_offline());
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn cached_month_is_empty_without_cache_line() {
        let service = service(
            Arc::new(FakeProvider::default()),
            Arc::new(InMemoryKeyValueStore::default()),
        );
        let month = service
            .cached_month(&makkah(), date(2024, 5, 1), &CalculationSettings::default())
            .expect("cached month");
        assert!(month.is_empty());
    }

    proptest! {
        #[test]
        fn cached_days_never_reach_the_provider(day in 1u32..=31) {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let store = Arc::new(InMemoryKeyValueStore::default());
                let settings = CalculationSettings::default();
                PrayerCache::new(Arc::clone(&store))
                    .put(
                        &CacheKey::derive(&makkah(), date(2024, 3, 1), &settings),
                        &month_of_days(2024, 3, 31),
                    )
                    .expect("seed cache");
                let provider = Arc::new(FakeProvider::default());
                let service = PrayerTimesService::new(Arc::clone(&provider), store);

                let record = service
                    .fetch_for_day(&makkah(), date(2024, 3, day), &settings)
                    .await
                    .expect("cached day");
                prop_assert_eq!(record.gregorian, date(2024, 3, day));
                prop_assert_eq!(provider.calls(), 0);
                Ok(())
            })?;
        }
    }
}
