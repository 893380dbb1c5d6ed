use serde::{Deserialize, Serialize};

/// A point on the map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Where the farmer is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub coordinates: Coordinates,
    pub place: Option<String>,
    pub district: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// Price of a crop at one market yard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MandiPrice {
    pub location: String,
    pub price: String,
    pub trend: Trend,
}

/// Prices for one crop across nearby markets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketComparison {
    pub crop: String,
    pub prices: Vec<MandiPrice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub is_alert: bool,
    #[serde(default)]
    pub is_transformation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityContact {
    pub name: String,
    pub role: String,
    pub contact: String,
    pub office: String,
}

/// Point-in-time bundle of local farm data
///
/// Frozen into the system prompt when a session starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub place: Option<String>,
    pub district: Option<String>,
    pub soil_ph: Option<String>,
    #[serde(default)]
    pub soil_types: Vec<String>,
    pub climate_trend: Option<String>,
    pub water_availability: Option<String>,
    pub weather: Option<String>,
    pub humidity: Option<String>,
    pub wind_speed: Option<String>,
    #[serde(default)]
    pub alerts: Vec<String>,
    #[serde(default)]
    pub market_rows: Vec<MarketComparison>,
    #[serde(default)]
    pub news_items: Vec<NewsItem>,
    #[serde(default)]
    pub authority_contacts: Vec<AuthorityContact>,
}

impl ContextSnapshot {
    /// One-line market summary, e.g. "Paddy is ₹2450/q in District Mandi"
    pub fn market_note(&self) -> String {
        self.market_rows
            .iter()
            .filter_map(|row| {
                row.prices
                    .first()
                    .map(|best| format!("{} is {} in {}", row.crop, best.price, best.location))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}
