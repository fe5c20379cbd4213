//! Typed field specification for a catalog snapshot.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::RecommendError;

/// How a missing text value is filled in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextKind {
    /// Free text such as lyrics; missing values become `""`.
    #[default]
    FreeText,
    /// Labels such as genre or language; missing values become `"unknown"`.
    Categorical,
}

impl TextKind {
    pub fn default_value(self) -> &'static str {
        match self {
            Self::FreeText => "",
            Self::Categorical => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericRange {
    /// Audio features in `[0,1]`; these are discretized into document tokens.
    #[default]
    Unit,
    /// Tempo, popularity and the like.
    Unbounded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextField {
    pub name: String,
    #[serde(default)]
    pub kind: TextKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericField {
    pub name: String,
    #[serde(default)]
    pub range: NumericRange,
    /// Stem used for discretized tokens (`high_<token>`); defaults to the lower-cased name.
    #[serde(default)]
    pub token: Option<String>,
}

impl NumericField {
    pub fn token_stem(&self) -> String {
        self.token.clone().unwrap_or_else(|| self.name.to_lowercase())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub title: String,
    pub attribution: String,
    #[serde(default)]
    pub text_fields: Vec<TextField>,
    #[serde(default)]
    pub numeric_fields: Vec<NumericField>,
    #[serde(default)]
    pub popularity: Option<String>,
}

impl FieldSpec {
    pub fn new(title: impl Into<String>, attribution: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            attribution: attribution.into(),
            text_fields: Vec::new(),
            numeric_fields: Vec::new(),
            popularity: None,
        }
    }

    pub fn with_text(mut self, name: impl Into<String>, kind: TextKind) -> Self {
        self.text_fields.push(TextField { name: name.into(), kind });
        self
    }

    pub fn with_unit_feature(mut self, name: impl Into<String>, token: Option<&str>) -> Self {
        self.numeric_fields.push(NumericField {
            name: name.into(),
            range: NumericRange::Unit,
            token: token.map(str::to_owned),
        });
        self
    }

    pub fn with_unbounded_feature(mut self, name: impl Into<String>) -> Self {
        self.numeric_fields.push(NumericField {
            name: name.into(),
            range: NumericRange::Unbounded,
            token: None,
        });
        self
    }

    pub fn with_popularity(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let declared =
            self.numeric_fields.iter().any(|field| field.name.eq_ignore_ascii_case(&name));
        if !declared {
            self = self.with_unbounded_feature(name.clone());
        }
        self.popularity = Some(name);
        self
    }

    pub fn text_field_index(&self, name: &str) -> Option<usize> {
        self.text_fields.iter().position(|field| field.name.eq_ignore_ascii_case(name))
    }

    /// Numeric lookups ignore ASCII case so `valence` resolves a `Valence` column.
    pub fn numeric_field_index(&self, name: &str) -> Option<usize> {
        self.numeric_fields.iter().position(|field| field.name.eq_ignore_ascii_case(name))
    }

    pub fn validate(&self) -> Result<(), RecommendError> {
        if self.title.trim().is_empty() || self.attribution.trim().is_empty() {
            return Err(RecommendError::Schema(
                "field spec requires non-empty title and attribution field names".to_owned(),
            ));
        }
        if self.title == self.attribution {
            return Err(RecommendError::Schema(format!(
                "title and attribution must be different fields (both are `{}`)",
                self.title
            )));
        }

        let mut seen = HashSet::new();
        for name in self.text_fields.iter().map(|field| &field.name) {
            if name.trim().is_empty() || !seen.insert(name.to_lowercase()) {
                return Err(RecommendError::Schema(format!(
                    "text field `{name}` is blank or declared twice"
                )));
            }
        }
        for field in &self.numeric_fields {
            if field.name.trim().is_empty() || !seen.insert(field.name.to_lowercase()) {
                return Err(RecommendError::Schema(format!(
                    "numeric field `{}` is blank or collides with another field",
                    field.name
                )));
            }
        }

        if let Some(popularity) = &self.popularity {
            if self.numeric_field_index(popularity).is_none() {
                return Err(RecommendError::Schema(format!(
                    "popularity field `{popularity}` is not a declared numeric field"
                )));
            }
        }

        Ok(())
    }
}

/// Built-in catalog shapes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogPreset {
    /// song, artist, genre, mood, lyrics
    #[default]
    LyricsCatalog,
    /// song, artist, text (lyrics), link
    MillionSong,
    /// song_name, singer, language plus audio features and popularity
    IndianLanguages,
}

impl CatalogPreset {
    pub fn field_spec(self) -> FieldSpec {
        match self {
            Self::LyricsCatalog => FieldSpec::new("song", "artist")
                .with_text("lyrics", TextKind::FreeText)
                .with_text("genre", TextKind::Categorical)
                .with_text("mood", TextKind::Categorical)
                .with_text("artist", TextKind::Categorical)
                .with_unit_feature("danceability", Some("dance"))
                .with_unit_feature("energy", None)
                .with_unit_feature("valence", None)
                .with_popularity("popularity"),
            Self::MillionSong => FieldSpec::new("song", "artist")
                .with_text("artist", TextKind::Categorical)
                .with_text("song", TextKind::Categorical)
                .with_text("text", TextKind::FreeText),
            Self::IndianLanguages => FieldSpec::new("song_name", "singer")
                .with_text("language", TextKind::Categorical)
                .with_text("singer", TextKind::Categorical)
                .with_text("song_name", TextKind::Categorical)
                .with_unit_feature("danceability", Some("dance"))
                .with_unit_feature("energy", None)
                .with_unit_feature("acousticness", Some("acoustic"))
                .with_unit_feature("Valence", Some("valence"))
                .with_unit_feature("liveness", None)
                .with_unit_feature("speechiness", None)
                .with_unbounded_feature("loudness")
                .with_unbounded_feature("tempo")
                .with_popularity("popularity"),
        }
    }

    /// Repeat counts that weight the textual fields of this shape.
    pub fn default_weights(self) -> BTreeMap<String, u32> {
        let pairs: &[(&str, u32)] = match self {
            Self::LyricsCatalog => &[("lyrics", 1), ("genre", 4), ("mood", 1), ("artist", 1)],
            Self::MillionSong => &[("artist", 3), ("song", 1), ("text", 1)],
            Self::IndianLanguages => &[("language", 2), ("singer", 3), ("song_name", 1)],
        };
        pairs.iter().map(|(name, weight)| ((*name).to_owned(), *weight)).collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LyricsCatalog => "lyrics_catalog",
            Self::MillionSong => "million_song",
            Self::IndianLanguages => "indian_languages",
        }
    }
}

impl std::str::FromStr for CatalogPreset {
    type Err = RecommendError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "lyrics_catalog" | "lyrics" => Ok(Self::LyricsCatalog),
            "million_song" | "spotify" => Ok(Self::MillionSong),
            "indian_languages" | "indian" => Ok(Self::IndianLanguages),
            other => Err(RecommendError::Schema(format!(
                "unsupported catalog preset `{other}` (expected lyrics_catalog|million_song|indian_languages)"
            ))),
        }
    }
}
