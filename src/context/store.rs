use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::prompt::Language;
use super::provider::{ContextProvider, GeolocationProvider};
use super::snapshot::{ContextSnapshot, LocationData};
use crate::error::Result;

/// Context store shared between the session actor and the HTTP surface
pub type SharedContext = Arc<RwLock<ContextStore>>;

/// Everything a session freezes at start
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionContext {
    pub location: LocationData,
    pub snapshot: ContextSnapshot,
    pub language: Language,
}

/// Current location, language, and the latest context snapshot
pub struct ContextStore {
    location: Option<LocationData>,
    fallback: LocationData,
    language: Language,
    snapshot: ContextSnapshot,
    refreshed_at: Option<DateTime<Utc>>,
    geolocation: Arc<dyn GeolocationProvider>,
    provider: Arc<dyn ContextProvider>,
}

impl ContextStore {
    pub fn new(
        fallback: LocationData,
        language: Language,
        geolocation: Arc<dyn GeolocationProvider>,
        provider: Arc<dyn ContextProvider>,
    ) -> Self {
        Self {
            location: None,
            fallback,
            language,
            snapshot: ContextSnapshot::default(),
            refreshed_at: None,
            geolocation,
            provider,
        }
    }

    pub fn shared(self) -> SharedContext {
        Arc::new(RwLock::new(self))
    }

    /// Re-locate and re-fetch local data
    ///
    /// A failed position lookup substitutes the fallback location only when no
    /// location is known yet. A failed fetch keeps the previous snapshot. Both
    /// are logged; the fetch error is also returned for callers that care.
    pub async fn refresh(&mut self) -> Result<()> {
        match self.geolocation.locate().await {
            Ok(coordinates) => {
                let changed = self.location.as_ref().map(|l| l.coordinates) != Some(coordinates);
                if changed {
                    self.location = Some(LocationData {
                        coordinates,
                        place: None,
                        district: None,
                    });
                }
            }
            Err(e) => {
                warn!("Geolocation failed: {}", e);
                if self.location.is_none() {
                    info!("Using fallback location {:?}", self.fallback.place);
                    self.location = Some(self.fallback.clone());
                }
            }
        }

        let coordinates = self.location().coordinates;
        match self.provider.fetch(coordinates, self.language).await {
            Ok(snapshot) => {
                if let Some(location) = self.location.as_mut() {
                    if snapshot.place.is_some() {
                        location.place = snapshot.place.clone();
                    }
                    if snapshot.district.is_some() {
                        location.district = snapshot.district.clone();
                    }
                }
                self.snapshot = snapshot;
                self.refreshed_at = Some(Utc::now());
                info!(
                    "Context refreshed for {:.4}, {:.4} ({})",
                    coordinates.latitude,
                    coordinates.longitude,
                    self.language.code()
                );
                Ok(())
            }
            Err(e) => {
                warn!("Context fetch failed, keeping previous data: {}", e);
                Err(e)
            }
        }
    }

    /// Change the conversation language; takes effect at the next session
    pub fn set_language(&mut self, language: Language) -> bool {
        let changed = self.language != language;
        self.language = language;
        changed
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn location(&self) -> &LocationData {
        self.location.as_ref().unwrap_or(&self.fallback)
    }

    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Freeze the current state for a new session
    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            location: self.location().clone(),
            snapshot: self.snapshot.clone(),
            language: self.language,
        }
    }
}
