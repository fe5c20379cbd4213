use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogPreset, FieldSpec};
use crate::compose::{Thresholds, WeightSpec, DEFAULT_HIGH_CUT, DEFAULT_LOW_CUT};
use crate::index::{IndexConfig, StopWords, StopWordsMode, DEFAULT_MAX_FEATURES};
use crate::matcher::{
    MatcherSettings, DEFAULT_MATCH_WEIGHT, DEFAULT_POPULARITY_WEIGHT, DEFAULT_WIDEN_MARGIN,
};
use crate::service::EngineSettings;

pub const DEFAULT_RECOMMEND_K: usize = 10;
pub const DEFAULT_MATCH_K: usize = 15;

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub composer: ComposerConfig,
    pub index: IndexSettings,
    pub similarity: SimilarityConfig,
    pub matcher: MatcherConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogConfig {
    pub path: Option<PathBuf>,
    pub preset: CatalogPreset,
    /// Inline field layout; replaces the preset's layout when set.
    pub fields: Option<FieldSpec>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComposerConfig {
    /// Layered on top of the preset's weights.
    pub weights: WeightSpec,
    pub high_cut: f64,
    pub low_cut: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexSettings {
    /// `0` keeps every term.
    pub max_features: usize,
    pub min_df: usize,
    pub max_df: f64,
    pub stopwords: StopWordsMode,
    pub extra_stopwords: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimilarityConfig {
    pub default_k: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatcherConfig {
    pub default_k: usize,
    pub widen_margin: f64,
    pub match_weight: f64,
    pub popularity_weight: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub catalog_path: Option<PathBuf>,
    pub preset: Option<CatalogPreset>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub max_features: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig { path: None, preset: CatalogPreset::default(), fields: None },
            composer: ComposerConfig {
                weights: WeightSpec::default(),
                high_cut: DEFAULT_HIGH_CUT,
                low_cut: DEFAULT_LOW_CUT,
            },
            index: IndexSettings {
                max_features: DEFAULT_MAX_FEATURES,
                min_df: 1,
                max_df: 1.0,
                stopwords: StopWordsMode::English,
                extra_stopwords: Vec::new(),
            },
            similarity: SimilarityConfig { default_k: DEFAULT_RECOMMEND_K },
            matcher: MatcherConfig {
                default_k: DEFAULT_MATCH_K,
                widen_margin: DEFAULT_WIDEN_MARGIN,
                match_weight: DEFAULT_MATCH_WEIGHT,
                popularity_weight: DEFAULT_POPULARITY_WEIGHT,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("melodex.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Field layout the catalog is normalized with.
    pub fn field_spec(&self) -> FieldSpec {
        self.catalog.fields.clone().unwrap_or_else(|| self.catalog.preset.field_spec())
    }

    pub fn weights(&self) -> WeightSpec {
        match self.catalog.fields {
            Some(_) => self.composer.weights.clone(),
            None => WeightSpec::new(self.catalog.preset.default_weights())
                .merged(&self.composer.weights),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let stop_words = StopWords::from_mode(self.index.stopwords)
            .with_extra(self.index.extra_stopwords.iter());

        EngineSettings {
            weights: self.weights(),
            thresholds: Thresholds { high: self.composer.high_cut, low: self.composer.low_cut },
            index: IndexConfig {
                max_features: (self.index.max_features > 0).then_some(self.index.max_features),
                min_df: self.index.min_df,
                max_df: self.index.max_df,
                stop_words,
                ..IndexConfig::default()
            },
            matcher: MatcherSettings {
                widen_margin: self.matcher.widen_margin,
                match_weight: self.matcher.match_weight,
                popularity_weight: self.matcher.popularity_weight,
            },
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(catalog) = patch.catalog {
            if let Some(path) = catalog.path {
                self.catalog.path = Some(path);
            }
            if let Some(preset) = catalog.preset {
                self.catalog.preset = preset;
            }
            if let Some(fields) = catalog.fields {
                self.catalog.fields = Some(fields);
            }
        }

        if let Some(composer) = patch.composer {
            if let Some(weights) = composer.weights {
                self.composer.weights = self.composer.weights.clone().merged(&weights);
            }
            if let Some(high_cut) = composer.high_cut {
                self.composer.high_cut = high_cut;
            }
            if let Some(low_cut) = composer.low_cut {
                self.composer.low_cut = low_cut;
            }
        }

        if let Some(index) = patch.index {
            if let Some(max_features) = index.max_features {
                self.index.max_features = max_features;
            }
            if let Some(min_df) = index.min_df {
                self.index.min_df = min_df;
            }
            if let Some(max_df) = index.max_df {
                self.index.max_df = max_df;
            }
            if let Some(stopwords) = index.stopwords {
                self.index.stopwords = stopwords;
            }
            if let Some(extra_stopwords) = index.extra_stopwords {
                self.index.extra_stopwords = extra_stopwords;
            }
        }

        if let Some(similarity) = patch.similarity {
            if let Some(default_k) = similarity.default_k {
                self.similarity.default_k = default_k;
            }
        }

        if let Some(matcher) = patch.matcher {
            if let Some(default_k) = matcher.default_k {
                self.matcher.default_k = default_k;
            }
            if let Some(widen_margin) = matcher.widen_margin {
                self.matcher.widen_margin = widen_margin;
            }
            if let Some(match_weight) = matcher.match_weight {
                self.matcher.match_weight = match_weight;
            }
            if let Some(popularity_weight) = matcher.popularity_weight {
                self.matcher.popularity_weight = popularity_weight;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MELODEX_CATALOG_PATH") {
            self.catalog.path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("MELODEX_CATALOG_PRESET") {
            self.catalog.preset = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "MELODEX_CATALOG_PRESET".to_string(),
                value: value.clone(),
            })?;
        }

        if let Some(value) = read_env("MELODEX_COMPOSER_HIGH_CUT") {
            self.composer.high_cut = parse_f64("MELODEX_COMPOSER_HIGH_CUT", &value)?;
        }
        if let Some(value) = read_env("MELODEX_COMPOSER_LOW_CUT") {
            self.composer.low_cut = parse_f64("MELODEX_COMPOSER_LOW_CUT", &value)?;
        }

        if let Some(value) = read_env("MELODEX_INDEX_MAX_FEATURES") {
            self.index.max_features = parse_usize("MELODEX_INDEX_MAX_FEATURES", &value)?;
        }
        if let Some(value) = read_env("MELODEX_INDEX_MIN_DF") {
            self.index.min_df = parse_usize("MELODEX_INDEX_MIN_DF", &value)?;
        }
        if let Some(value) = read_env("MELODEX_INDEX_MAX_DF") {
            self.index.max_df = parse_f64("MELODEX_INDEX_MAX_DF", &value)?;
        }
        if let Some(value) = read_env("MELODEX_INDEX_STOPWORDS") {
            self.index.stopwords = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "MELODEX_INDEX_STOPWORDS".to_string(),
                value: value.clone(),
            })?;
        }
        if let Some(value) = read_env("MELODEX_INDEX_EXTRA_STOPWORDS") {
            self.index.extra_stopwords = value
                .split(',')
                .map(str::trim)
                .filter(|word| !word.is_empty())
                .map(str::to_lowercase)
                .collect();
        }

        if let Some(value) = read_env("MELODEX_SIMILARITY_DEFAULT_K") {
            self.similarity.default_k = parse_usize("MELODEX_SIMILARITY_DEFAULT_K", &value)?;
        }

        if let Some(value) = read_env("MELODEX_MATCHER_DEFAULT_K") {
            self.matcher.default_k = parse_usize("MELODEX_MATCHER_DEFAULT_K", &value)?;
        }
        if let Some(value) = read_env("MELODEX_MATCHER_WIDEN_MARGIN") {
            self.matcher.widen_margin = parse_f64("MELODEX_MATCHER_WIDEN_MARGIN", &value)?;
        }
        if let Some(value) = read_env("MELODEX_MATCHER_MATCH_WEIGHT") {
            self.matcher.match_weight = parse_f64("MELODEX_MATCHER_MATCH_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("MELODEX_MATCHER_POPULARITY_WEIGHT") {
            self.matcher.popularity_weight =
                parse_f64("MELODEX_MATCHER_POPULARITY_WEIGHT", &value)?;
        }

        let log_level = read_env("MELODEX_LOGGING_LEVEL").or_else(|| read_env("MELODEX_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MELODEX_LOGGING_FORMAT").or_else(|| read_env("MELODEX_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(catalog_path) = overrides.catalog_path {
            self.catalog.path = Some(catalog_path);
        }
        if let Some(preset) = overrides.preset {
            self.catalog.preset = preset;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(max_features) = overrides.max_features {
            self.index.max_features = max_features;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_catalog(&self.catalog)?;
        validate_composer(&self.composer)?;
        validate_index(&self.index)?;
        validate_k("similarity.default_k", self.similarity.default_k)?;
        validate_matcher(&self.matcher)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("melodex.toml"), PathBuf::from("config/melodex.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    if let Some(fields) = &catalog.fields {
        fields
            .validate()
            .map_err(|error| ConfigError::Validation(format!("catalog.fields: {error}")))?;
    }
    Ok(())
}

fn validate_composer(composer: &ComposerConfig) -> Result<(), ConfigError> {
    if let Some((field, _)) = composer.weights.entries().iter().find(|(_, weight)| **weight == 0) {
        return Err(ConfigError::Validation(format!(
            "composer.weights.{field} must be at least 1"
        )));
    }

    let in_unit = |value: f64| value.is_finite() && (0.0..=1.0).contains(&value);
    if !in_unit(composer.high_cut) || !in_unit(composer.low_cut) {
        return Err(ConfigError::Validation(
            "composer.high_cut and composer.low_cut must be in range 0.0..=1.0".to_string(),
        ));
    }
    if composer.low_cut >= composer.high_cut {
        return Err(ConfigError::Validation(
            "composer.low_cut must be lower than composer.high_cut".to_string(),
        ));
    }

    Ok(())
}

fn validate_index(index: &IndexSettings) -> Result<(), ConfigError> {
    if index.min_df == 0 {
        return Err(ConfigError::Validation("index.min_df must be greater than zero".to_string()));
    }
    if !(index.max_df > 0.0 && index.max_df <= 1.0) {
        return Err(ConfigError::Validation("index.max_df must be in range (0.0, 1.0]".to_string()));
    }
    Ok(())
}

fn validate_matcher(matcher: &MatcherConfig) -> Result<(), ConfigError> {
    validate_k("matcher.default_k", matcher.default_k)?;

    if !matcher.widen_margin.is_finite() || matcher.widen_margin < 0.0 {
        return Err(ConfigError::Validation(
            "matcher.widen_margin must be a non-negative number".to_string(),
        ));
    }

    let non_negative = |value: f64| value.is_finite() && value >= 0.0;
    if !non_negative(matcher.match_weight) || !non_negative(matcher.popularity_weight) {
        return Err(ConfigError::Validation(
            "matcher.match_weight and matcher.popularity_weight must be non-negative".to_string(),
        ));
    }
    if matcher.match_weight + matcher.popularity_weight == 0.0 {
        return Err(ConfigError::Validation(
            "matcher.match_weight and matcher.popularity_weight cannot both be zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_k(key: &str, k: usize) -> Result<(), ConfigError> {
    if k == 0 {
        return Err(ConfigError::Validation(format!("{key} must be greater than zero")));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    catalog: Option<CatalogPatch>,
    composer: Option<ComposerPatch>,
    index: Option<IndexPatch>,
    similarity: Option<SimilarityPatch>,
    matcher: Option<MatcherPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    path: Option<PathBuf>,
    preset: Option<CatalogPreset>,
    fields: Option<FieldSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct ComposerPatch {
    weights: Option<WeightSpec>,
    high_cut: Option<f64>,
    low_cut: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct IndexPatch {
    max_features: Option<usize>,
    min_df: Option<usize>,
    max_df: Option<f64>,
    stopwords: Option<StopWordsMode>,
    extra_stopwords: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct SimilarityPatch {
    default_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct MatcherPatch {
    default_k: Option<usize>,
    widen_margin: Option<f64>,
    match_weight: Option<f64>,
    popularity_weight: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
