use crate::application::notification_scheduler::{DeliveryContext, NotificationScheduler};
use crate::domain::models::{format_duration, DayRecord, EventName};
use crate::domain::resolver::resolve;
use crate::infrastructure::error::InfraError;
use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

pub type LocalNowProvider = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

pub fn local_now_provider(timezone: Tz) -> LocalNowProvider {
    Arc::new(move || Utc::now().with_timezone(&timezone).naive_local())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownState {
    pub now: Option<NaiveDateTime>,
    pub next: Option<EventName>,
    pub remaining_seconds: i64,
    pub display: String,
}

impl Default for CountdownState {
    fn default() -> Self {
        Self {
            now: None,
            next: None,
            remaining_seconds: 0,
            display: format_duration(0),
        }
    }
}

/// 1 Hz driver: resolves the countdown, publishes it and hands the tick to the
/// scheduler. Only the loaded day's table is evaluated, and only when it is today's.
pub struct TickLoop {
    scheduler: Arc<NotificationScheduler>,
    active_day: watch::Receiver<Option<DayRecord>>,
    context: watch::Receiver<DeliveryContext>,
    countdown: Arc<watch::Sender<CountdownState>>,
    now_provider: LocalNowProvider,
    period: Duration,
}

impl TickLoop {
    pub fn new(
        scheduler: Arc<NotificationScheduler>,
        active_day: watch::Receiver<Option<DayRecord>>,
        context: watch::Receiver<DeliveryContext>,
        countdown: Arc<watch::Sender<CountdownState>>,
        now_provider: LocalNowProvider,
    ) -> Self {
        Self {
            scheduler,
            active_day,
            context,
            countdown,
            now_provider,
            period: TICK_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// One evaluation cycle. The countdown is published before delivery so a
    /// failing store or sink never freezes it.
    pub fn tick_once(&self) -> Result<CountdownState, InfraError> {
        let now = (self.now_provider)();
        let day = self.active_day.borrow().clone();
        let context = *self.context.borrow();

        let Some(day) = day.filter(|day| day.gregorian == now.date()) else {
            let state = CountdownState {
                now: Some(now),
                ..CountdownState::default()
            };
            self.countdown.send_replace(state.clone());
            return Ok(state);
        };

        let resolved = resolve(&day.timings, now.time());
        let state = CountdownState {
            now: Some(now),
            next: Some(resolved.next),
            remaining_seconds: resolved.remaining_seconds,
            display: format_duration(resolved.remaining_seconds),
        };
        self.countdown.send_replace(state.clone());

        self.scheduler.on_tick(&day.timings, now, &context)?;
        Ok(state)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(period_ms = self.period.as_millis() as u64, "tick loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.guarded_tick(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("tick loop stopped");
    }

    fn guarded_tick(&self) {
        match catch_unwind(AssertUnwindSafe(|| self.tick_once())) {
            Ok(Ok(_)) => {}
            Ok(Err(error)) => tracing::warn!(%error, "tick failed; continuing"),
            Err(_) => tracing::warn!("tick panicked; continuing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::tests::sample_table;
    use crate::domain::models::{AdhanSound, Language, NotificationKey};
    use crate::infrastructure::fired_keys::{FiredKeyStore, InMemoryFiredKeyStore};
    use crate::infrastructure::notification_sink::tests::RecordingSink;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingStore;

    impl FiredKeyStore for FailingStore {
        fn mark_if_absent(&self, _key: &NotificationKey) -> Result<bool, InfraError> {
            Err(InfraError::Notification("store offline".to_string()))
        }

        fn contains(&self, _key: &NotificationKey) -> Result<bool, InfraError> {
            Ok(false)
        }

        fn rotate(&self, _today: NaiveDate) -> Result<usize, InfraError> {
            Ok(0)
        }

        fn len(&self) -> Result<usize, InfraError> {
            Ok(0)
        }
    }

    fn march(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date")
    }

    fn record(day: NaiveDate) -> DayRecord {
        DayRecord {
            gregorian: day,
            readable: day.format("%d %b %Y").to_string(),
            hijri: None,
            timezone: None,
            timings: sample_table(),
        }
    }

    fn fixed_now(hour: u32, minute: u32, second: u32) -> LocalNowProvider {
        let now = march(15).and_hms_opt(hour, minute, second).expect("valid time");
        Arc::new(move || now)
    }

    fn context() -> DeliveryContext {
        DeliveryContext {
            notifications_enabled: true,
            do_not_disturb: false,
            adhan_sound: AdhanSound::Beep,
            language: Language::En,
        }
    }

    struct Harness {
        tick_loop: TickLoop,
        countdown: watch::Receiver<CountdownState>,
        sink: Arc<RecordingSink>,
        _day: watch::Sender<Option<DayRecord>>,
        _context: watch::Sender<DeliveryContext>,
    }

    fn harness(
        store: Arc<dyn FiredKeyStore>,
        day: Option<DayRecord>,
        now_provider: LocalNowProvider,
    ) -> Harness {
        let sink = Arc::new(RecordingSink::granted());
        let scheduler = Arc::new(NotificationScheduler::new(store, sink.clone()));
        let (day_tx, day_rx) = watch::channel(day);
        let (context_tx, context_rx) = watch::channel(context());
        let (countdown_tx, countdown_rx) = watch::channel(CountdownState::default());
        Harness {
            tick_loop: TickLoop::new(
                scheduler,
                day_rx,
                context_rx,
                Arc::new(countdown_tx),
                now_provider,
            ),
            countdown: countdown_rx,
            sink,
            _day: day_tx,
            _context: context_tx,
        }
    }

    #[test]
    fn publishes_countdown_for_today() {
        let harness = harness(
            Arc::new(InMemoryFiredKeyStore::default()),
            Some(record(march(15))),
            fixed_now(18, 9, 55),
        );

        let state = harness.tick_loop.tick_once().expect("tick");
        assert_eq!(state.next, Some(EventName::Maghrib));
        assert_eq!(state.remaining_seconds, 5);
        assert_eq!(state.display, "00:00:05");
        assert_eq!(*harness.countdown.borrow(), state);
    }

    #[test]
    fn other_day_table_yields_zero_countdown_and_no_delivery() {
        let harness = harness(
            Arc::new(InMemoryFiredKeyStore::default()),
            Some(record(march(20))),
            fixed_now(18, 10, 0),
        );

        let state = harness.tick_loop.tick_once().expect("tick");
        assert_eq!(state.remaining_seconds, 0);
        assert_eq!(state.display, "00:00:00");
        assert_eq!(state.next, None);
        assert!(harness.sink.shown().is_empty());
    }

    #[test]
    fn store_failure_still_publishes_countdown() {
        let harness = harness(Arc::new(FailingStore), Some(record(march(15))), fixed_now(18, 10, 0));

        assert!(harness.tick_loop.tick_once().is_err());
        assert_eq!(harness.countdown.borrow().next, Some(EventName::Isha));
    }

    #[tokio::test]
    async fn loop_survives_failing_ticks_until_shutdown() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let now = march(15).and_hms_opt(18, 10, 0).expect("valid time");
        let now_provider: LocalNowProvider = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            now
        });
        let harness = harness(Arc::new(FailingStore), Some(record(march(15))), now_provider);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(
            harness
                .tick_loop
                .with_period(Duration::from_millis(5))
                .run(shutdown_rx),
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown_tx.send(true).expect("send shutdown");
        handle.await.expect("loop joined");

        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }
}
