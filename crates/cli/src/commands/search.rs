use melodex_core::config::LoadOptions;
use melodex_core::{BrowseMode, ItemSummary};
use serde::Serialize;

use super::{load_engine, CommandResult, EXIT_INVALID_INPUT};

#[derive(Debug, Serialize)]
struct SearchData {
    query: String,
    limit: usize,
    items: Vec<ItemSummary>,
}

#[derive(Debug, Serialize)]
struct BrowseData {
    field: String,
    value: String,
    mode: BrowseMode,
    limit: usize,
    items: Vec<ItemSummary>,
}

pub fn run(options: &LoadOptions, query: &str, limit: usize) -> CommandResult {
    let (_, recommender) = match load_engine("search", options) {
        Ok(engine) => engine,
        Err(failure) => return failure,
    };

    let items = recommender.search(query, limit);
    CommandResult::success_with_data(
        "search",
        format!("{} songs match `{query}`", items.len()),
        SearchData { query: query.to_string(), limit, items },
    )
}

pub fn browse(
    options: &LoadOptions,
    field: &str,
    value: &str,
    mode: BrowseMode,
    limit: usize,
) -> CommandResult {
    let (_, recommender) = match load_engine("browse", options) {
        Ok(engine) => engine,
        Err(failure) => return failure,
    };

    match recommender.browse(field, value, mode, limit) {
        Ok(items) => CommandResult::success_with_data(
            "browse",
            format!("{} songs with {field} = `{value}`", items.len()),
            BrowseData { field: field.to_string(), value: value.to_string(), mode, limit, items },
        ),
        Err(error) => CommandResult::failure(
            "browse",
            error.error_class(),
            error.to_string(),
            EXIT_INVALID_INPUT,
        ),
    }
}
