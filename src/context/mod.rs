//! Farm context injected into each voice session
//!
//! Location, local soil/weather/market data and the conversation language are
//! gathered here and frozen into the system prompt when a session starts.

mod prompt;
mod provider;
mod snapshot;
mod store;

pub use prompt::{build_system_prompt, render_context, Language, SYSTEM_INSTRUCTION};
pub use provider::{ContextProvider, FixedGeolocation, GeolocationProvider, StaticContextProvider};
pub use snapshot::{
    AuthorityContact, ContextSnapshot, Coordinates, LocationData, MandiPrice, MarketComparison,
    NewsItem, Trend,
};
pub use store::{ContextStore, SessionContext, SharedContext};
