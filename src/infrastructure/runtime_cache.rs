//! Coarse runtime cache for HTTP assets fetched outside the monthly prayer cache:
//! time-table and Quran API responses, map tiles and font files.

use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use url::Url;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    StaleWhileRevalidate,
    CacheFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    pub max_entries: usize,
    pub max_age: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostMatch {
    Exact(&'static str),
    Suffix(&'static str),
}

impl HostMatch {
    fn matches(self, host: &str) -> bool {
        match self {
            Self::Exact(expected) => host.eq_ignore_ascii_case(expected),
            Self::Suffix(suffix) => {
                host.eq_ignore_ascii_case(suffix)
                    || host.to_ascii_lowercase().ends_with(&format!(".{suffix}"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoute {
    pub cache_name: &'static str,
    pub policy: CachePolicy,
    pub expiration: ExpirationPolicy,
    hosts: Vec<HostMatch>,
}

impl CacheRoute {
    fn matches(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| self.hosts.iter().any(|candidate| candidate.matches(host)))
            .unwrap_or(false)
    }
}

pub fn default_routes() -> Vec<CacheRoute> {
    vec![
        CacheRoute {
            cache_name: "api-cache",
            policy: CachePolicy::StaleWhileRevalidate,
            expiration: ExpirationPolicy {
                max_entries: 100,
                max_age: Duration::days(30),
            },
            hosts: vec![
                HostMatch::Exact("api.aladhan.com"),
                HostMatch::Exact("api.alquran.cloud"),
            ],
        },
        CacheRoute {
            cache_name: "map-tiles",
            policy: CachePolicy::CacheFirst,
            expiration: ExpirationPolicy {
                max_entries: 500,
                max_age: Duration::days(365),
            },
            hosts: vec![HostMatch::Suffix("tile.openstreetmap.org")],
        },
        CacheRoute {
            cache_name: "google-fonts",
            policy: CachePolicy::CacheFirst,
            expiration: ExpirationPolicy {
                max_entries: 30,
                max_age: Duration::days(365),
            },
            hosts: vec![
                HostMatch::Exact("fonts.googleapis.com"),
                HostMatch::Exact("fonts.gstatic.com"),
            ],
        },
    ]
}

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestAssetFetcher {
    client: Client,
}

impl ReqwestAssetFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl AssetFetcher for ReqwestAssetFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, InfraError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| InfraError::Http(format!("network error while fetching {url}: {error}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(InfraError::Http(format!("{url}: http {}", status.as_u16())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|error| InfraError::Http(format!("network error while reading {url}: {error}")))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Clone)]
struct CachedAsset {
    body: Vec<u8>,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Cache,
    Network,
}

#[derive(Debug)]
pub struct Served {
    pub body: Vec<u8>,
    pub source: ServedFrom,
    /// Background refresh started for a stale-while-revalidate hit.
    pub revalidation: Option<JoinHandle<()>>,
}

pub struct RuntimeCache<F>
where
    F: AssetFetcher + ?Sized + 'static,
{
    fetcher: Arc<F>,
    routes: Vec<CacheRoute>,
    buckets: Mutex<HashMap<&'static str, HashMap<String, CachedAsset>>>,
    now_provider: NowProvider,
}

impl<F> RuntimeCache<F>
where
    F: AssetFetcher + ?Sized + 'static,
{
    pub fn new(fetcher: Arc<F>) -> Self {
        Self {
            fetcher,
            routes: default_routes(),
            buckets: Mutex::new(HashMap::new()),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn route_for(&self, url: &Url) -> Option<&CacheRoute> {
        self.routes.iter().find(|route| route.matches(url))
    }

    pub async fn handle(self: &Arc<Self>, raw_url: &str) -> Result<Served, InfraError> {
        let url = Url::parse(raw_url)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid asset url '{raw_url}': {error}")))?;

        let Some(route) = self.route_for(&url).cloned() else {
            let body = self.fetcher.fetch(&url).await?;
            return Ok(Served {
                body,
                source: ServedFrom::Network,
                revalidation: None,
            });
        };

        if let Some(body) = self.lookup(&route, url.as_str())? {
            let revalidation = match route.policy {
                CachePolicy::CacheFirst => None,
                CachePolicy::StaleWhileRevalidate => Some(self.spawn_revalidation(route, url)),
            };
            return Ok(Served {
                body,
                source: ServedFrom::Cache,
                revalidation,
            });
        }

        let body = self.fetcher.fetch(&url).await?;
        self.store(&route, url.as_str(), body.clone())?;
        Ok(Served {
            body,
            source: ServedFrom::Network,
            revalidation: None,
        })
    }

    pub fn entry_count(&self, cache_name: &str) -> Result<usize, InfraError> {
        let buckets = self
            .buckets
            .lock()
            .map_err(|error| InfraError::lock_poisoned("runtime cache", error))?;
        Ok(buckets.get(cache_name).map(HashMap::len).unwrap_or(0))
    }

    fn spawn_revalidation(self: &Arc<Self>, route: CacheRoute, url: Url) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            match cache.fetcher.fetch(&url).await {
                Ok(body) => {
                    if let Err(error) = cache.store(&route, url.as_str(), body) {
                        tracing::warn!(%url, %error, "runtime cache revalidation store failed");
                    }
                }
                Err(error) => tracing::debug!(%url, %error, "runtime cache revalidation failed"),
            }
        })
    }

    fn lookup(&self, route: &CacheRoute, key: &str) -> Result<Option<Vec<u8>>, InfraError> {
        let now = (self.now_provider)();
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|error| InfraError::lock_poisoned("runtime cache", error))?;
        let Some(bucket) = buckets.get_mut(route.cache_name) else {
            return Ok(None);
        };
        match bucket.get(key) {
            Some(asset) if now - asset.stored_at <= route.expiration.max_age => {
                Ok(Some(asset.body.clone()))
            }
            Some(_) => {
                bucket.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn store(&self, route: &CacheRoute, key: &str, body: Vec<u8>) -> Result<(), InfraError> {
        let now = (self.now_provider)();
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|error| InfraError::lock_poisoned("runtime cache", error))?;
        let bucket = buckets.entry(route.cache_name).or_default();
        bucket.insert(
            key.to_string(),
            CachedAsset {
                body,
                stored_at: now,
            },
        );

        bucket.retain(|_, asset| now - asset.stored_at <= route.expiration.max_age);
        while bucket.len() > route.expiration.max_entries {
            let Some(oldest) = bucket
                .iter()
                .min_by_key(|(_, asset)| asset.stored_at)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            bucket.remove(&oldest);
        }
        Ok(())
    }
}
