use crate::domain::models::{Coordinates, FALLBACK_COORDINATES};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use serde::Serialize;

/// One-shot position request.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, InfraError>;
}

/// Position supplied by the host (command line, platform service) or absent.
#[derive(Debug, Clone, Default)]
pub struct FixedGeolocation {
    position: Option<Coordinates>,
}

impl FixedGeolocation {
    pub fn new(position: Option<Coordinates>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl GeolocationProvider for FixedGeolocation {
    async fn current_position(&self) -> Result<Coordinates, InfraError> {
        let position = self
            .position
            .ok_or_else(|| InfraError::InvalidConfig("no position available".to_string()))?;
        position.validate().map_err(InfraError::InvalidConfig)?;
        Ok(position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Manual,
    Device,
    Fallback,
}

/// Manual coordinates win; otherwise the provider is asked once and any failure
/// falls back to Makkah so the scheduler always has an input.
pub async fn resolve_coordinates<G>(
    manual: Option<Coordinates>,
    provider: &G,
) -> (Coordinates, LocationSource)
where
    G: GeolocationProvider + ?Sized,
{
    if let Some(manual) = manual {
        return (manual, LocationSource::Manual);
    }
    match provider.current_position().await {
        Ok(position) => (position, LocationSource::Device),
        Err(error) => {
            tracing::warn!(%error, "geolocation failed; using fallback coordinates");
            (FALLBACK_COORDINATES, LocationSource::Fallback)
        }
    }
}
