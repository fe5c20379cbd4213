//! Signal tables for the feature-range matcher.
//!
//! A weather condition (optionally adjusted by temperature) or a named mood maps
//! to inclusive windows on `energy`, `valence` and `danceability`, plus soft
//! keyword filters on the `mood` and `genre` text fields for catalogs that carry
//! no audio features.

use std::fmt;
use std::str::FromStr;

use melodex_core::{FeatureWeights, FeatureWindow, FeatureWindows, KeywordFilter, NumericRange};
use serde::Serialize;
use tracing::warn;

const ENERGY: &str = "energy";
const VALENCE: &str = "valence";
const DANCEABILITY: &str = "danceability";
const MOOD_FIELD: &str = "mood";
const GENRE_FIELD: &str = "genre";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalProfile {
    pub mood: &'static str,
    pub windows: FeatureWindows,
    pub weights: FeatureWeights,
    pub keywords: Vec<KeywordFilter>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum WeatherCondition {
    Clear,
    Clouds,
    Rain,
    Drizzle,
    Thunderstorm,
    Snow,
    Mist,
    Fog,
    Haze,
}

impl WeatherCondition {
    /// Unrecognized conditions fall back to `Clear`.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_else(|_| {
            warn!(
                event_name = "presets.weather.unknown_condition",
                condition = %label,
                "unknown weather condition; using clear"
            );
            Self::Clear
        })
    }

    fn table(self) -> ((f64, f64), (f64, f64), (f64, f64), &'static str) {
        match self {
            Self::Clear => ((0.6, 1.0), (0.6, 1.0), (0.5, 1.0), "happy"),
            Self::Clouds | Self::Mist | Self::Fog => ((0.3, 0.6), (0.4, 0.7), (0.3, 0.6), "calm"),
            Self::Rain => ((0.2, 0.5), (0.2, 0.5), (0.2, 0.5), "melancholic"),
            Self::Drizzle => ((0.3, 0.6), (0.3, 0.6), (0.3, 0.6), "relaxed"),
            Self::Thunderstorm => ((0.7, 1.0), (0.5, 0.8), (0.6, 1.0), "energetic"),
            Self::Snow => ((0.2, 0.5), (0.5, 0.8), (0.2, 0.5), "peaceful"),
            Self::Haze => ((0.4, 0.7), (0.4, 0.7), (0.4, 0.7), "relaxed"),
        }
    }

    pub fn genres(self) -> &'static [&'static str] {
        match self {
            Self::Clear => &["pop", "dance", "electronic", "reggae"],
            Self::Clouds => &["indie", "folk", "acoustic", "ambient"],
            Self::Rain => &["jazz", "blues", "r&b", "soul"],
            Self::Drizzle => &["indie", "folk", "acoustic", "lo-fi"],
            Self::Thunderstorm => &["rock", "metal", "electronic", "hip-hop"],
            Self::Snow => &["classical", "ambient", "indie", "folk"],
            Self::Mist | Self::Fog => &["ambient", "electronic", "chill", "lo-fi"],
            Self::Haze => &["pop", "indie"],
        }
    }
}

impl FromStr for WeatherCondition {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "clear" => Ok(Self::Clear),
            "clouds" | "cloudy" => Ok(Self::Clouds),
            "rain" => Ok(Self::Rain),
            "drizzle" => Ok(Self::Drizzle),
            "thunderstorm" => Ok(Self::Thunderstorm),
            "snow" => Ok(Self::Snow),
            "mist" => Ok(Self::Mist),
            "fog" => Ok(Self::Fog),
            "haze" => Ok(Self::Haze),
            other => Err(format!("unknown weather condition `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureBand {
    VeryCold,
    Cold,
    Mild,
    Warm,
    Hot,
}

impl TemperatureBand {
    pub fn from_celsius(celsius: f64) -> Self {
        if celsius < 0.0 {
            Self::VeryCold
        } else if celsius < 15.0 {
            Self::Cold
        } else if celsius < 25.0 {
            Self::Mild
        } else if celsius < 35.0 {
            Self::Warm
        } else {
            Self::Hot
        }
    }

    /// `(energy, valence)` shift applied to the condition's windows.
    pub fn adjustment(self) -> (f64, f64) {
        match self {
            Self::VeryCold => (-0.2, -0.1),
            Self::Cold => (-0.1, 0.0),
            Self::Mild => (0.0, 0.1),
            Self::Warm => (0.1, 0.2),
            Self::Hot => (0.2, 0.1),
        }
    }

    /// Mood keyword added alongside the condition's own.
    pub fn mood(self) -> &'static str {
        match self {
            Self::VeryCold => "cozy",
            Self::Cold => "calm",
            Self::Mild => "relaxed",
            Self::Warm => "happy",
            Self::Hot => "energetic",
        }
    }
}

pub fn weather_profile(condition: WeatherCondition, celsius: Option<f64>) -> SignalProfile {
    let (energy, valence, dance, mood) = condition.table();
    let band = celsius.map(TemperatureBand::from_celsius);
    let (energy_shift, valence_shift) = band.map(TemperatureBand::adjustment).unwrap_or((0.0, 0.0));

    let windows = [
        (ENERGY, window(energy).shifted(energy_shift, NumericRange::Unit)),
        (VALENCE, window(valence).shifted(valence_shift, NumericRange::Unit)),
        (DANCEABILITY, window(dance)),
    ];
    let moods = std::iter::once(mood).chain(band.map(TemperatureBand::mood));
    let keywords = vec![
        KeywordFilter::new(MOOD_FIELD, moods),
        KeywordFilter::new(GENRE_FIELD, condition.genres()),
    ];
    SignalProfile { mood, windows: collect(windows), weights: default_weights(), keywords }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Happy,
    Sad,
    Energetic,
    Calm,
    Relaxed,
    Romantic,
    Party,
}

impl Mood {
    pub const ALL: [Mood; 7] = [
        Mood::Happy,
        Mood::Sad,
        Mood::Energetic,
        Mood::Calm,
        Mood::Relaxed,
        Mood::Romantic,
        Mood::Party,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Energetic => "energetic",
            Self::Calm => "calm",
            Self::Relaxed => "relaxed",
            Self::Romantic => "romantic",
            Self::Party => "party",
        }
    }

    fn table(self) -> ((f64, f64), (f64, f64), (f64, f64)) {
        match self {
            Self::Happy => ((0.6, 1.0), (0.6, 1.0), (0.5, 1.0)),
            Self::Sad => ((0.2, 0.5), (0.0, 0.4), (0.2, 0.5)),
            Self::Energetic => ((0.7, 1.0), (0.5, 1.0), (0.6, 1.0)),
            Self::Calm | Self::Relaxed => ((0.3, 0.6), (0.4, 0.7), (0.3, 0.6)),
            Self::Romantic => ((0.3, 0.6), (0.5, 0.8), (0.3, 0.6)),
            Self::Party => ((0.7, 1.0), (0.7, 1.0), (0.7, 1.0)),
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mood| mood.as_str() == wanted)
            .ok_or_else(|| format!("unknown mood `{wanted}`; expected one of {}", mood_names()))
    }
}

/// Comma-separated mood names, for help and error text.
pub fn mood_names() -> String {
    Mood::ALL.iter().map(|mood| mood.as_str()).collect::<Vec<_>>().join(", ")
}

pub fn mood_profile(mood: Mood) -> SignalProfile {
    let (energy, valence, dance) = mood.table();
    let windows =
        [(ENERGY, window(energy)), (VALENCE, window(valence)), (DANCEABILITY, window(dance))];
    SignalProfile {
        mood: mood.as_str(),
        windows: collect(windows),
        weights: default_weights(),
        keywords: vec![KeywordFilter::new(MOOD_FIELD, [mood.as_str()])],
    }
}

fn default_weights() -> FeatureWeights {
    [(ENERGY, 0.4), (VALENCE, 0.4), (DANCEABILITY, 0.2)]
        .into_iter()
        .map(|(name, weight)| (name.to_owned(), weight))
        .collect()
}

fn window((min, max): (f64, f64)) -> FeatureWindow {
    FeatureWindow::new(min, max)
}

fn collect<const N: usize>(windows: [(&str, FeatureWindow); N]) -> FeatureWindows {
    windows.into_iter().map(|(name, window)| (name.to_owned(), window)).collect()
}
