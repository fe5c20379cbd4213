use melodex_core::config::LoadOptions;
use melodex_core::{BuildStats, CatalogStats};
use serde::Serialize;

use super::{load_engine, CommandResult, EXIT_INVALID_INPUT};

const COMMAND: &str = "stats";

#[derive(Debug, Serialize)]
struct StatsData {
    preset: &'static str,
    build: BuildStats,
    catalog: CatalogStats,
}

pub fn run(options: &LoadOptions, count_field: Option<&str>) -> CommandResult {
    let (config, recommender) = match load_engine(COMMAND, options) {
        Ok(engine) => engine,
        Err(failure) => return failure,
    };

    let catalog = match recommender.stats(count_field) {
        Ok(catalog) => catalog,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                error.error_class(),
                error.to_string(),
                EXIT_INVALID_INPUT,
            )
        }
    };

    let message = format!(
        "{} songs, {} terms in the vocabulary",
        catalog.rows, catalog.vocabulary_size
    );
    CommandResult::success_with_data(
        COMMAND,
        message,
        StatsData {
            preset: config.catalog.preset.as_str(),
            build: recommender.build_stats().clone(),
            catalog,
        },
    )
}
