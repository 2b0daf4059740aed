pub mod config;
pub mod error;
pub mod fired_keys;
pub mod geolocation;
pub mod kv_store;
pub mod notification_sink;
pub mod prayer_cache;
pub mod runtime_cache;
pub mod storage;
pub mod telemetry;
pub mod timetable_client;
