// System prompt assembly
//
// The mentor instruction is fixed; the real-time context block and language
// preference are appended from the snapshot taken when the session starts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::snapshot::{ContextSnapshot, LocationData};

pub const SYSTEM_INSTRUCTION: &str = "\
You are AgriVoice AI, a world-class agricultural mentor. Your goal is to have a natural, duplex voice conversation with farmers, exactly like a helpful human expert walking through the field with them.

CONVERSATIONAL RULES:
1. LANGUAGE EXCELLENCE: You are fluent in English and Telugu. Use warm, regional Telugu (e.g., 'నమస్కారం రైతు సోదరులకు') when appropriate. You can code-switch naturally.
2. PROACTIVE MENTORSHIP: Do not wait to be asked. If you see a weather alert, market price surge, or a soil pH issue in the context, bring it up immediately.
3. BREVITY: Keep responses to 1-3 short, meaningful sentences. Voice chat should be fast and punchy.
4. REAL-TIME AWARENESS: You are in a \"Live\" session. If the user interrupts you, stop immediately.
5. CONTEXT-FIRST: Tailor advice to their specific coordinates, local soil, and recent mandi prices provided in the context.

Tone: Professional, Wise, Encouraging, and Locally Rooted.
";

/// Conversation languages offered to farmers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "hi")]
    Hindi,
    #[serde(rename = "te")]
    Telugu,
    #[serde(rename = "kn")]
    Kannada,
    #[serde(rename = "ta")]
    Tamil,
    #[serde(rename = "ml")]
    Malayalam,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::English,
        Language::Hindi,
        Language::Telugu,
        Language::Kannada,
        Language::Tamil,
        Language::Malayalam,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
            Language::Telugu => "te",
            Language::Kannada => "kn",
            Language::Tamil => "ta",
            Language::Malayalam => "ml",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "हिन्दी (Hindi)",
            Language::Telugu => "తెలుగు (Telugu)",
            Language::Kannada => "ಕನ್ನಡ (Kannada)",
            Language::Tamil => "தமிழ் (Tamil)",
            Language::Malayalam => "മലയാളം (Malayalam)",
        }
    }

    /// Look up a language by code, falling back to English
    pub fn from_code(code: &str) -> Self {
        code.parse().unwrap_or_default()
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(code.trim()))
            .ok_or_else(|| format!("unsupported language code: {}", code))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or("unknown")
}

/// Render the "FARMER CURRENT DATA" block
pub fn render_context(location: &LocationData, snapshot: &ContextSnapshot) -> String {
    let place = snapshot.place.as_deref().or(location.place.as_deref());
    let district = snapshot.district.as_deref().or(location.district.as_deref());

    format!(
        "FARMER CURRENT DATA:\n\
         - Location: {}, {} ({:.4}, {:.4})\n\
         - Current Weather: {}, Humidity {}\n\
         - Soil Condition: pH {}, Type {}\n\
         - Water Table: {}\n\
         - Market Note: {}\n\
         - Recent Alert: {}\n",
        or_unknown(place),
        or_unknown(district),
        location.coordinates.latitude,
        location.coordinates.longitude,
        or_unknown(snapshot.weather.as_deref()),
        or_unknown(snapshot.humidity.as_deref()),
        or_unknown(snapshot.soil_ph.as_deref()),
        snapshot.soil_types.join(", "),
        or_unknown(snapshot.water_availability.as_deref()),
        snapshot.market_note(),
        or_unknown(snapshot.alerts.first().map(String::as_str)),
    )
}

/// Full system prompt for one session
pub fn build_system_prompt(
    location: &LocationData,
    snapshot: &ContextSnapshot,
    language: Language,
) -> String {
    format!(
        "{}\nREAL-TIME CONTEXT:\n{}\nLanguage Preference: {}.\n\
         Handle English and Telugu with native fluency. Be a proactive field mentor.",
        SYSTEM_INSTRUCTION,
        render_context(location, snapshot),
        language.display_name()
    )
}
