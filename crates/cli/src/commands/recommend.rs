use melodex_core::config::LoadOptions;
use melodex_core::Recommendation;
use serde::Serialize;

use super::{load_engine, CommandResult};

const COMMAND: &str = "recommend";

#[derive(Debug, Serialize)]
struct RecommendData {
    query: String,
    k: usize,
    recommendations: Vec<Recommendation>,
}

pub fn run(options: &LoadOptions, title: &str, k: Option<usize>) -> CommandResult {
    let (config, recommender) = match load_engine(COMMAND, options) {
        Ok(engine) => engine,
        Err(failure) => return failure,
    };
    let k = k.unwrap_or(config.similarity.default_k);

    match recommender.recommend(title, k) {
        Ok(recommendations) => {
            let message = format!("{} songs similar to `{title}`", recommendations.len());
            CommandResult::success_with_data(
                COMMAND,
                message,
                RecommendData { query: title.to_string(), k, recommendations },
            )
        }
        Err(error) => CommandResult::engine_failure(COMMAND, &error),
    }
}
