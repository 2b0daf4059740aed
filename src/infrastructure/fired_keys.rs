use crate::domain::models::NotificationKey;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_database;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const DEFAULT_FIRED_KEY_CAPACITY: usize = 50;

/// Dedup record of notifications already delivered.
///
/// `mark_if_absent` is the single check-and-record step: it returns `true` exactly
/// once per key for as long as the key is retained.
pub trait FiredKeyStore: Send + Sync {
    fn mark_if_absent(&self, key: &NotificationKey) -> Result<bool, InfraError>;
    fn contains(&self, key: &NotificationKey) -> Result<bool, InfraError>;
    /// Drops every key that does not belong to `today`; returns how many were dropped.
    fn rotate(&self, today: NaiveDate) -> Result<usize, InfraError>;
    fn len(&self) -> Result<usize, InfraError>;
}

#[derive(Debug, Default)]
struct BoundedKeys {
    order: VecDeque<NotificationKey>,
    members: HashSet<NotificationKey>,
}

/// Process-local store bounded to `capacity` keys, evicting the oldest first.
#[derive(Debug)]
pub struct InMemoryFiredKeyStore {
    capacity: usize,
    keys: Mutex<BoundedKeys>,
}

impl InMemoryFiredKeyStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            keys: Mutex::new(BoundedKeys::default()),
        }
    }
}

impl Default for InMemoryFiredKeyStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FIRED_KEY_CAPACITY)
    }
}

impl FiredKeyStore for InMemoryFiredKeyStore {
    fn mark_if_absent(&self, key: &NotificationKey) -> Result<bool, InfraError> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|error| InfraError::lock_poisoned("fired keys", error))?;
        if !keys.members.insert(*key) {
            return Ok(false);
        }
        keys.order.push_back(*key);
        while keys.order.len() > self.capacity {
            if let Some(oldest) = keys.order.pop_front() {
                keys.members.remove(&oldest);
            }
        }
        Ok(true)
    }

    fn contains(&self, key: &NotificationKey) -> Result<bool, InfraError> {
        let keys = self
            .keys
            .lock()
            .map_err(|error| InfraError::lock_poisoned("fired keys", error))?;
        Ok(keys.members.contains(key))
    }

    fn rotate(&self, today: NaiveDate) -> Result<usize, InfraError> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|error| InfraError::lock_poisoned("fired keys", error))?;
        let before = keys.order.len();
        keys.order.retain(|key| key.day == today);
        let retained = keys.order.iter().copied().collect::<HashSet<_>>();
        keys.members = retained;
        Ok(before - keys.order.len())
    }

    fn len(&self) -> Result<usize, InfraError> {
        let keys = self
            .keys
            .lock()
            .map_err(|error| InfraError::lock_poisoned("fired keys", error))?;
        Ok(keys.order.len())
    }
}

/// Durable store shared by the foreground tick loop and the background delivery path.
#[derive(Debug, Clone)]
pub struct SqliteFiredKeyStore {
    db_path: PathBuf,
    capacity: usize,
}

impl SqliteFiredKeyStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            capacity: DEFAULT_FIRED_KEY_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_database(&self.db_path)
    }
}

impl FiredKeyStore for SqliteFiredKeyStore {
    fn mark_if_absent(&self, key: &NotificationKey) -> Result<bool, InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        let inserted = transaction.execute(
            "INSERT OR IGNORE INTO fired_notifications (notification_key, day, fired_at)
             VALUES (?1, ?2, ?3)",
            params![
                key.to_string(),
                key.day.format("%Y-%m-%d").to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        if inserted > 0 {
            transaction.execute(
                "DELETE FROM fired_notifications WHERE seq NOT IN (
                   SELECT seq FROM fired_notifications ORDER BY seq DESC LIMIT ?1
                 )",
                params![self.capacity as i64],
            )?;
        }
        transaction.commit()?;
        Ok(inserted > 0)
    }

    fn contains(&self, key: &NotificationKey) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM fired_notifications WHERE notification_key = ?1",
            params![key.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn rotate(&self, today: NaiveDate) -> Result<usize, InfraError> {
        let connection = self.connect()?;
        let removed = connection.execute(
            "DELETE FROM fired_notifications WHERE day <> ?1",
            params![today.format("%Y-%m-%d").to_string()],
        )?;
        Ok(removed)
    }

    fn len(&self) -> Result<usize, InfraError> {
        let connection = self.connect()?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM fired_notifications", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EventName, NotificationKind};
    use crate::infrastructure::storage::initialize_database;
    use proptest::prelude::*;

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn key(event: EventName, kind: NotificationKind, on: &str) -> NotificationKey {
        NotificationKey::new(event, kind, day(on))
    }

    struct TempDatabase {
        path: PathBuf,
    }

    impl TempDatabase {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "mawaqit-fired-{name}-{}.sqlite",
                std::process::id()
            ));
            let _ = std::fs::remove_file(&path);
            initialize_database(&path).expect("init db");
            Self { path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    #[test]
    fn in_memory_marks_each_key_once() {
        let store = InMemoryFiredKeyStore::default();
        let maghrib = key(EventName::Maghrib, NotificationKind::Adhan, "2024-03-15");

        assert!(store.mark_if_absent(&maghrib).expect("first mark"));
        assert!(!store.mark_if_absent(&maghrib).expect("second mark"));
        assert!(store.contains(&maghrib).expect("contains"));
    }

    #[test]
    fn in_memory_overflow_evicts_oldest_only() {
        let store = InMemoryFiredKeyStore::with_capacity(2);
        let fajr = key(EventName::Fajr, NotificationKind::Adhan, "2024-03-15");
        let dhuhr = key(EventName::Dhuhr, NotificationKind::Adhan, "2024-03-15");
        let asr = key(EventName::Asr, NotificationKind::Adhan, "2024-03-15");

        store.mark_if_absent(&fajr).expect("mark fajr");
        store.mark_if_absent(&dhuhr).expect("mark dhuhr");
        store.mark_if_absent(&asr).expect("mark asr");

        assert_eq!(store.len().expect("len"), 2);
        assert!(!store.contains(&fajr).expect("fajr evicted"));
        assert!(store.contains(&dhuhr).expect("dhuhr kept"));
        assert!(store.contains(&asr).expect("asr kept"));
    }

    #[test]
    fn in_memory_rotation_keeps_only_today() {
        let store = InMemoryFiredKeyStore::default();
        store
            .mark_if_absent(&key(EventName::Isha, NotificationKind::Adhan, "2024-03-14"))
            .expect("mark yesterday");
        let today = key(EventName::Fajr, NotificationKind::PreReminder15m, "2024-03-15");
        store.mark_if_absent(&today).expect("mark today");

        assert_eq!(store.rotate(day("2024-03-15")).expect("rotate"), 1);
        assert_eq!(store.len().expect("len"), 1);
        assert!(store.contains(&today).expect("today kept"));
    }

    #[test]
    fn sqlite_store_is_shared_between_handles() {
        let database = TempDatabase::new("shared");
        let foreground = SqliteFiredKeyStore::new(&database.path);
        let background = SqliteFiredKeyStore::new(&database.path);
        let maghrib = key(EventName::Maghrib, NotificationKind::Adhan, "2024-03-15");

        assert!(foreground.mark_if_absent(&maghrib).expect("foreground mark"));
        assert!(!background.mark_if_absent(&maghrib).expect("background mark"));
        assert!(background.contains(&maghrib).expect("visible to background"));
    }

    #[test]
    fn sqlite_store_bounds_and_rotates() {
        let database = TempDatabase::new("bounded");
        let store = SqliteFiredKeyStore::new(&database.path).with_capacity(3);
        for event in EventName::PRIMARY {
            store
                .mark_if_absent(&key(event, NotificationKind::Adhan, "2024-03-15"))
                .expect("mark");
        }
        assert_eq!(store.len().expect("len"), 3);
        assert!(!store
            .contains(&key(EventName::Fajr, NotificationKind::Adhan, "2024-03-15"))
            .expect("oldest evicted"));
        assert!(store
            .contains(&key(EventName::Isha, NotificationKind::Adhan, "2024-03-15"))
            .expect("newest kept"));

        store
            .mark_if_absent(&key(EventName::Fajr, NotificationKind::Adhan, "2024-03-16"))
            .expect("mark next day");
        assert_eq!(store.rotate(day("2024-03-16")).expect("rotate"), 2);
        assert_eq!(store.len().expect("len"), 1);
    }

    proptest! {
        #[test]
        fn bounded_store_never_exceeds_capacity(
            capacity in 1usize..20,
            events in proptest::collection::vec((0usize..6, 0usize..4, 0i64..30), 0..120),
        ) {
            let store = InMemoryFiredKeyStore::with_capacity(capacity);
            let base = day("2024-01-01");
            for (event_index, kind_index, offset) in events {
                let candidate = NotificationKey::new(
                    EventName::PRIMARY[event_index],
                    NotificationKind::ALL[kind_index],
                    base + chrono::Duration::days(offset),
                );
                store.mark_if_absent(&candidate).expect("mark");
                prop_assert!(store.contains(&candidate).expect("just marked key is present"));
                prop_assert!(store.len().expect("len") <= capacity);
            }
        }
    }
}
