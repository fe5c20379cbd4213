pub mod catalog_file;
pub mod commands;
pub mod logging;
pub mod presets;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use melodex_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use melodex_core::search::DEFAULT_SEARCH_LIMIT;
use melodex_core::{BrowseMode, CatalogPreset};

use commands::matching::MatchArgs;
use commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "melodex",
    about = "Melodex song recommender CLI",
    long_about = "Build a content index over a song catalog and query it by title, audio-feature \
                  windows, weather, or mood.",
    after_help = "Examples:\n  melodex --catalog songs.json recommend \"Yellow\" -k 5\n  \
                  melodex --catalog songs.json match --mood happy\n  \
                  melodex --catalog songs.json match --weather rain --temperature 8\n  \
                  melodex doctor --json"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Path to a melodex.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Catalog file (JSON array or JSON lines)")]
    catalog: Option<PathBuf>,
    #[arg(long, global = true, value_parser = parse_preset, help = "Catalog shape preset")]
    preset: Option<CatalogPreset>,
    #[arg(long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Recommend songs whose content is most similar to a title")]
    Recommend {
        title: String,
        #[arg(short, long, help = "Number of recommendations")]
        k: Option<usize>,
    },
    #[command(about = "Match songs against audio-feature windows, a weather signal, or a mood")]
    Match {
        #[arg(long, help = "Weather condition such as clear, rain, snow, thunderstorm")]
        weather: Option<String>,
        #[arg(long, allow_hyphen_values = true, help = "Temperature in Celsius")]
        temperature: Option<f64>,
        #[arg(long, help = format!("Mood: {}", presets::mood_names()))]
        mood: Option<String>,
        #[arg(long = "window", value_name = "FEATURE=MIN:MAX")]
        windows: Vec<String>,
        #[arg(long = "weight", value_name = "FEATURE=WEIGHT")]
        weights: Vec<String>,
        #[arg(long = "keyword", value_name = "FIELD=WORD[,WORD]", help = "Soft text filter")]
        keywords: Vec<String>,
        #[arg(long, value_name = "FIELD=VALUE", help = "Soft attribute preference")]
        prefer: Option<String>,
        #[arg(short, long)]
        k: Option<usize>,
    },
    #[command(about = "Find songs whose title or attribution contains the query")]
    Search {
        #[arg(default_value = "")]
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    #[command(about = "List songs whose field equals (or contains) a value, ignoring case")]
    Browse {
        field: String,
        value: String,
        #[arg(long, help = "Match values that contain the text, e.g. `pop` in `indie pop`")]
        contains: bool,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    #[command(about = "Summarize the loaded catalog and index")]
    Stats {
        #[arg(long, help = "Count distinct values of this text field")]
        count_field: Option<String>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, catalog readability, and index build")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

fn parse_preset(value: &str) -> Result<CatalogPreset, String> {
    value.parse::<CatalogPreset>().map_err(|error| error.to_string())
}

impl GlobalArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                catalog_path: self.catalog.clone(),
                preset: self.preset,
                log_level: self.log_level.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    let logging = AppConfig::load(options.clone())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    logging::init_logging(&logging);

    let result = match cli.command {
        Command::Recommend { title, k } => commands::recommend::run(&options, &title, k),
        Command::Match { weather, temperature, mood, windows, weights, keywords, prefer, k } => {
            let args =
                MatchArgs { weather, temperature, mood, windows, weights, keywords, prefer, k };
            commands::matching::run(&options, &args)
        }
        Command::Search { query, limit } => commands::search::run(&options, &query, limit),
        Command::Browse { field, value, contains, limit } => {
            let mode = if contains { BrowseMode::Contains } else { BrowseMode::Exact };
            commands::search::browse(&options, &field, &value, mode, limit)
        }
        Command::Stats { count_field } => commands::stats::run(&options, count_field.as_deref()),
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run(&options) },
        Command::Doctor { json } => commands::doctor::run(&options, json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
