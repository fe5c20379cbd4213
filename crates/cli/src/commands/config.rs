use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use melodex_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];

    let catalog_path = match &config.catalog.path {
        Some(path) => path.display().to_string(),
        None => "<unset>".to_string(),
    };
    let catalog_path_source = if options.overrides.catalog_path.is_some() {
        "override (--catalog)".to_string()
    } else {
        source("catalog.path", &["MELODEX_CATALOG_PATH"])
    };
    lines.push(render_line("catalog.path", &catalog_path, catalog_path_source));

    let preset_source = if options.overrides.preset.is_some() {
        "override (--preset)".to_string()
    } else {
        source("catalog.preset", &["MELODEX_CATALOG_PRESET"])
    };
    lines.push(render_line("catalog.preset", config.catalog.preset.as_str(), preset_source));

    let fields = config.field_spec();
    let layout = format!(
        "title={} attribution={} text={} numeric={}",
        fields.title,
        fields.attribution,
        fields.text_fields.len(),
        fields.numeric_fields.len()
    );
    lines.push(render_line("catalog.fields", &layout, source("catalog.fields", &[])));

    let weights = config
        .weights()
        .entries()
        .iter()
        .map(|(name, weight)| format!("{name}={weight}"))
        .collect::<Vec<_>>()
        .join(",");
    lines.push(render_line("composer.weights", &weights, source("composer.weights", &[])));
    lines.push(render_line(
        "composer.high_cut",
        &config.composer.high_cut.to_string(),
        source("composer.high_cut", &["MELODEX_COMPOSER_HIGH_CUT"]),
    ));
    lines.push(render_line(
        "composer.low_cut",
        &config.composer.low_cut.to_string(),
        source("composer.low_cut", &["MELODEX_COMPOSER_LOW_CUT"]),
    ));

    lines.push(render_line(
        "index.max_features",
        &config.index.max_features.to_string(),
        source("index.max_features", &["MELODEX_INDEX_MAX_FEATURES"]),
    ));
    lines.push(render_line(
        "index.min_df",
        &config.index.min_df.to_string(),
        source("index.min_df", &["MELODEX_INDEX_MIN_DF"]),
    ));
    lines.push(render_line(
        "index.max_df",
        &config.index.max_df.to_string(),
        source("index.max_df", &["MELODEX_INDEX_MAX_DF"]),
    ));
    lines.push(render_line(
        "index.stopwords",
        &format!("{:?}", config.index.stopwords),
        source("index.stopwords", &["MELODEX_INDEX_STOPWORDS"]),
    ));
    let extra_stopwords = if config.index.extra_stopwords.is_empty() {
        "<none>".to_string()
    } else {
        config.index.extra_stopwords.join(",")
    };
    lines.push(render_line(
        "index.extra_stopwords",
        &extra_stopwords,
        source("index.extra_stopwords", &["MELODEX_INDEX_EXTRA_STOPWORDS"]),
    ));

    lines.push(render_line(
        "similarity.default_k",
        &config.similarity.default_k.to_string(),
        source("similarity.default_k", &["MELODEX_SIMILARITY_DEFAULT_K"]),
    ));
    lines.push(render_line(
        "matcher.default_k",
        &config.matcher.default_k.to_string(),
        source("matcher.default_k", &["MELODEX_MATCHER_DEFAULT_K"]),
    ));
    lines.push(render_line(
        "matcher.widen_margin",
        &config.matcher.widen_margin.to_string(),
        source("matcher.widen_margin", &["MELODEX_MATCHER_WIDEN_MARGIN"]),
    ));
    lines.push(render_line(
        "matcher.match_weight",
        &config.matcher.match_weight.to_string(),
        source("matcher.match_weight", &["MELODEX_MATCHER_MATCH_WEIGHT"]),
    ));
    lines.push(render_line(
        "matcher.popularity_weight",
        &config.matcher.popularity_weight.to_string(),
        source("matcher.popularity_weight", &["MELODEX_MATCHER_POPULARITY_WEIGHT"]),
    ));

    let level_source = if options.overrides.log_level.is_some() {
        "override (--log-level)".to_string()
    } else {
        source("logging.level", &["MELODEX_LOGGING_LEVEL", "MELODEX_LOG_LEVEL"])
    };
    lines.push(render_line("logging.level", &config.logging.level, level_source));
    let format_source = if options.overrides.log_format.is_some() {
        "override".to_string()
    } else {
        source("logging.format", &["MELODEX_LOGGING_FORMAT", "MELODEX_LOG_FORMAT"])
    };
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        format_source,
    ));

    lines.join("\n")
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("melodex.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/melodex.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

/// Env keys are checked in the order the loader reads them, so an alias only
/// wins when the primary key is unset.
fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let set_key = env_keys
        .iter()
        .find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()));
    if let Some(env_key) = set_key {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
