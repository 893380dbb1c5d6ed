use async_trait::async_trait;

use super::prompt::Language;
use super::snapshot::{
    AuthorityContact, ContextSnapshot, Coordinates, MandiPrice, MarketComparison, NewsItem, Trend,
};
use crate::error::{Result, VoiceError};

/// Supplies local farm data for a location
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Fetch a fresh snapshot; failures are `VoiceError::ContextFetch`
    async fn fetch(&self, coordinates: Coordinates, language: Language) -> Result<ContextSnapshot>;
}

/// Supplies the device position
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn locate(&self) -> Result<Coordinates>;
}

/// Geolocation pinned to configured coordinates
///
/// With no coordinates configured every lookup fails, which makes the store
/// fall back to its default location.
pub struct FixedGeolocation {
    coordinates: Option<Coordinates>,
}

impl FixedGeolocation {
    pub fn new(coordinates: Option<Coordinates>) -> Self {
        Self { coordinates }
    }
}

#[async_trait]
impl GeolocationProvider for FixedGeolocation {
    async fn locate(&self) -> Result<Coordinates> {
        self.coordinates
            .ok_or_else(|| VoiceError::ContextFetch("no position available".to_string()))
    }
}

/// Built-in regional dataset
///
/// Serves the same regional picture for any coordinates, with place and
/// crop names localized for Hindi and Telugu.
#[derive(Debug, Default)]
pub struct StaticContextProvider;

#[async_trait]
impl ContextProvider for StaticContextProvider {
    async fn fetch(&self, _coordinates: Coordinates, language: Language) -> Result<ContextSnapshot> {
        let (place, district) = match language {
            Language::Hindi => ("शांतिपुर", "लखनऊ"),
            Language::Telugu => ("కోనసీమ", "కాకినాడ"),
            _ => ("Rural Sector", "Agri Zone"),
        };
        let crop = match language {
            Language::Hindi => "धान",
            _ => "Paddy",
        };

        Ok(ContextSnapshot {
            place: Some(place.to_string()),
            district: Some(district.to_string()),
            soil_ph: Some("6.8".to_string()),
            soil_types: vec!["Loamy Alluvial".to_string()],
            climate_trend: Some("Monsoon Humidity".to_string()),
            water_availability: Some("32ft Depth".to_string()),
            weather: Some("31°C".to_string()),
            humidity: Some("82%".to_string()),
            wind_speed: Some("14 km/h".to_string()),
            alerts: vec!["Pest warning issued for neighboring blocks. Inspect your crops.".to_string()],
            market_rows: vec![MarketComparison {
                crop: crop.to_string(),
                prices: vec![
                    MandiPrice {
                        location: "District Mandi".to_string(),
                        price: "₹2450/q".to_string(),
                        trend: Trend::Up,
                    },
                    MandiPrice {
                        location: "Central Yard".to_string(),
                        price: "₹2380/q".to_string(),
                        trend: Trend::Stable,
                    },
                ],
            }],
            news_items: vec![
                NewsItem {
                    title: "Drone Spraying Subsidy".to_string(),
                    summary: "Get 50% off on drone rental.".to_string(),
                    source: "AgriNews".to_string(),
                    url: "#".to_string(),
                    is_alert: false,
                    is_transformation: true,
                },
                NewsItem {
                    title: "Locust Warning".to_string(),
                    summary: "Swarm movements detected.".to_string(),
                    source: "Regional Hub".to_string(),
                    url: "#".to_string(),
                    is_alert: true,
                    is_transformation: false,
                },
            ],
            authority_contacts: vec![
                AuthorityContact {
                    name: "Dr. Aruna Singh".to_string(),
                    role: "District Agri Officer".to_string(),
                    contact: "+91 94412 00334".to_string(),
                    office: "Collectorate Complex".to_string(),
                },
                AuthorityContact {
                    name: "Mr. S. Rao".to_string(),
                    role: "Irrigation Engineer".to_string(),
                    contact: "+91 98845 11223".to_string(),
                    office: "Water Dept Office".to_string(),
                },
            ],
        })
    }
}
