pub mod config;
pub mod doctor;
pub mod matching;
pub mod recommend;
pub mod search;
pub mod stats;

use melodex_core::config::{AppConfig, LoadOptions};
use melodex_core::{RecommendError, Recommender};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::catalog_file;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_CATALOG: u8 = 3;
pub const EXIT_BUILD: u8 = 4;
pub const EXIT_NOT_FOUND: u8 = 5;
pub const EXIT_INVALID_INPUT: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, Value::Null)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: impl Serialize,
    ) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), 1);
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub(crate) fn engine_failure(command: &str, error: &RecommendError) -> Self {
        let exit_code = if error.is_not_found() { EXIT_NOT_FOUND } else { EXIT_BUILD };
        Self::failure(command, error.error_class(), error.to_string(), exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(command: &str, options: &LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(command, "config_validation", error.to_string(), EXIT_CONFIG)
    })
}

/// Loads configuration and the catalog, then builds a recommender snapshot.
pub(crate) fn load_engine(
    command: &str,
    options: &LoadOptions,
) -> Result<(AppConfig, Recommender), CommandResult> {
    let config = load_config(command, options)?;

    let Some(path) = config.catalog.path.clone() else {
        return Err(CommandResult::failure(
            command,
            "catalog_missing",
            "no catalog configured; pass --catalog or set catalog.path / MELODEX_CATALOG_PATH",
            EXIT_CATALOG,
        ));
    };

    let rows = catalog_file::load_rows(&path).map_err(|error| {
        CommandResult::failure(command, "catalog_io", format!("{error:#}"), EXIT_CATALOG)
    })?;

    let recommender = Recommender::build(&rows, &config.field_spec(), &config.engine_settings())
        .map_err(|error| CommandResult::engine_failure(command, &error))?;

    info!(
        event_name = "cli.engine.ready",
        command,
        catalog = %path.display(),
        rows = recommender.len(),
        "catalog loaded"
    );

    Ok((config, recommender))
}
