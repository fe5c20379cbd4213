use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use melodex_cli::commands::matching::MatchArgs;
use melodex_cli::commands::{config, doctor, matching, recommend, search, stats};
use melodex_core::config::{ConfigOverrides, LoadOptions};
use melodex_core::BrowseMode;
use serde_json::Value;
use tempfile::TempDir;

const SONGS: &str = r#"[
  {"song": "Song A", "artist": "X", "lyrics": "sun bright happy", "genre": "pop", "energy": 0.2, "popularity": 40},
  {"song": "Song B", "artist": "X", "lyrics": "sun bright happy", "genre": "pop", "energy": 0.3, "popularity": 80},
  {"song": "Song C", "artist": "Y", "lyrics": "rain dark sad", "genre": "blues", "energy": 0.1, "popularity": 60}
]"#;

#[test]
fn recommend_ranks_the_identical_song_first() {
    let (_dir, options) = catalog_options(SONGS);
    with_env(&[], || {
        let result = recommend::run(&options, "Song A", Some(2));
        assert_eq!(result.exit_code, 0, "expected successful recommend: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "recommend");
        assert_eq!(payload["status"], "ok");
        let recommendations = payload["data"]["recommendations"].as_array().expect("list");
        assert_eq!(recommendations.len(), 2);
        assert_eq!(recommendations[0]["title"], "Song B");
        assert_eq!(recommendations[1]["title"], "Song C");
        assert!(recommendations[0]["score"].as_f64() > recommendations[1]["score"].as_f64());
    });
}

#[test]
fn recommend_unknown_title_is_not_found() {
    let (_dir, options) = catalog_options(SONGS);
    with_env(&[], || {
        let result = recommend::run(&options, "Nothing Like It", None);
        assert_eq!(result.exit_code, 5);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "not_found");
    });
}

#[test]
fn missing_catalog_fails_before_building() {
    with_env(&[], || {
        let result = recommend::run(&LoadOptions::default(), "Song A", None);
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "catalog_missing");

        let options = options_for(PathBuf::from("/nonexistent/melodex/songs.json"));
        let result = recommend::run(&options, "Song A", None);
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "catalog_io");
    });
}

#[test]
fn catalog_path_is_read_from_env() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("songs.jsonl");
    let lines = serde_json::from_str::<Vec<Value>>(SONGS)
        .expect("fixture parses")
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(&path, lines).expect("write catalog");
    let path = path.display().to_string();

    with_env(&[("MELODEX_CATALOG_PATH", path.as_str())], || {
        let result = recommend::run(&LoadOptions::default(), "song b", Some(1));
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["recommendations"][0]["title"], "Song A");
    });
}

#[test]
fn invalid_env_override_is_a_config_failure() {
    let (_dir, options) = catalog_options(SONGS);
    with_env(&[("MELODEX_INDEX_MAX_DF", "lots")], || {
        let result = recommend::run(&options, "Song A", None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "recommend");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn match_widens_when_no_song_is_energetic() {
    let (_dir, options) = catalog_options(SONGS);
    with_env(&[], || {
        let args = MatchArgs {
            windows: vec!["energy=0.6:1.0".to_string()],
            k: Some(5),
            ..MatchArgs::default()
        };
        let result = matching::run(&options, &args);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["widened"], true);
        let min = payload["data"]["applied_windows"]["energy"]["min"].as_f64().expect("min");
        assert!((min - 0.4).abs() < 1e-9);
        assert_eq!(payload["data"]["requested_windows"]["energy"]["min"], 0.6);
        assert!(payload["data"]["recommendations"].as_array().expect("list").is_empty());
    });
}

#[test]
fn match_by_mood_reports_the_signal() {
    let (_dir, options) = catalog_options(SONGS);
    with_env(&[], || {
        let args = MatchArgs {
            mood: Some("calm".to_string()),
            k: Some(2),
            ..MatchArgs::default()
        };
        let result = matching::run(&options, &args);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["signal"], "mood:calm");
        assert!(payload["data"]["recommendations"].as_array().expect("list").len() <= 2);
    });
}

const MOODY_SONGS: &str = r#"[
  {"song": "Party Hit", "artist": "P", "lyrics": "dance all night", "genre": "pop", "mood": "happy"},
  {"song": "Blue Night", "artist": "J", "lyrics": "quiet streets", "genre": "jazz", "mood": "melancholic"},
  {"song": "Soul Rain", "artist": "S", "lyrics": "grey window", "genre": "soul", "mood": "melancholic"},
  {"song": "Indie Days", "artist": "I", "lyrics": "long summer", "genre": "indie pop", "mood": "happy"}
]"#;

#[test]
fn rain_favours_melancholic_jazz_on_text_only_catalogs() {
    let (_dir, options) = catalog_options(MOODY_SONGS);
    with_env(&[], || {
        let args =
            MatchArgs { weather: Some("rain".to_string()), k: Some(2), ..MatchArgs::default() };
        let result = matching::run(&options, &args);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        let titles: Vec<&str> = payload["data"]["recommendations"]
            .as_array()
            .expect("list")
            .iter()
            .filter_map(|item| item["title"].as_str())
            .collect();
        assert_eq!(titles, vec!["Blue Night", "Soul Rain"]);
        assert_eq!(
            payload["data"]["keyword_filters_applied"],
            serde_json::json!(["mood", "genre"])
        );
        assert_eq!(payload["data"]["requested_keywords"][1]["field"], "genre");
    });
}

#[test]
fn clear_weather_keeps_happy_pop() {
    let (_dir, options) = catalog_options(MOODY_SONGS);
    with_env(&[], || {
        let args = MatchArgs {
            weather: Some("clear".to_string()),
            temperature: Some(30.0),
            k: Some(5),
            ..MatchArgs::default()
        };
        let result = matching::run(&options, &args);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        let titles: Vec<&str> = payload["data"]["recommendations"]
            .as_array()
            .expect("list")
            .iter()
            .filter_map(|item| item["title"].as_str())
            .collect();
        assert_eq!(titles, vec!["Party Hit", "Indie Days"]);
    });
}

#[test]
fn browse_contains_finds_multi_valued_genres() {
    let (_dir, options) = catalog_options(MOODY_SONGS);
    with_env(&[], || {
        let exact = search::browse(&options, "genre", "pop", BrowseMode::Exact, 10);
        let exact = parse_payload(&exact.output);
        assert_eq!(exact["data"]["items"].as_array().expect("items").len(), 1);

        let result = search::browse(&options, "genre", "pop", BrowseMode::Contains, 10);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["mode"], "contains");
        let titles: Vec<&str> = payload["data"]["items"]
            .as_array()
            .expect("items")
            .iter()
            .filter_map(|item| item["title"].as_str())
            .collect();
        assert_eq!(titles, vec!["Party Hit", "Indie Days"]);
    });
}

#[test]
fn match_without_windows_is_invalid_input() {
    let (_dir, options) = catalog_options(SONGS);
    with_env(&[], || {
        let result = matching::run(&options, &MatchArgs::default());
        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn search_and_browse_return_catalog_items() {
    let (_dir, options) = catalog_options(SONGS);
    with_env(&[], || {
        let result = search::run(&options, "song", 2);
        assert_eq!(result.exit_code, 0);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["items"].as_array().expect("items").len(), 2);

        let result = search::browse(&options, "genre", "POP", BrowseMode::Exact, 10);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        let titles: Vec<&str> = payload["data"]["items"]
            .as_array()
            .expect("items")
            .iter()
            .filter_map(|item| item["title"].as_str())
            .collect();
        assert_eq!(titles, vec!["Song A", "Song B"]);

        let result = search::browse(&options, "decade", "1990s", BrowseMode::Exact, 10);
        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "schema");
    });
}

#[test]
fn stats_counts_values_of_a_field() {
    let (_dir, options) = catalog_options(SONGS);
    with_env(&[], || {
        let result = stats::run(&options, Some("genre"));
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["preset"], "lyrics_catalog");
        assert_eq!(payload["data"]["catalog"]["rows"], 3);
        assert_eq!(payload["data"]["catalog"]["distinct_attributions"], 2);
        assert_eq!(payload["data"]["build"]["raw_rows"], 3);
        assert!(payload["data"]["catalog"]["value_counts"].is_array());
    });
}

#[test]
fn config_reports_env_sources() {
    with_env(&[("MELODEX_MATCHER_DEFAULT_K", "7")], || {
        let output = config::run(&LoadOptions::default());
        let expected = "- matcher.default_k = 7 (source: env (MELODEX_MATCHER_DEFAULT_K))";
        assert!(output.lines().any(|line| line == expected), "{output}");
        assert!(output.lines().any(|line| line.starts_with("- catalog.path = <unset>")));
    });
}

#[test]
fn config_reports_matcher_blend_and_log_level_aliases() {
    with_env(
        &[
            ("MELODEX_MATCHER_POPULARITY_WEIGHT", "0.5"),
            ("MELODEX_INDEX_EXTRA_STOPWORDS", "chorus,verse"),
            ("MELODEX_LOG_LEVEL", "warn"),
        ],
        || {
            let output = config::run(&LoadOptions::default());
            for expected in [
                "- matcher.popularity_weight = 0.5 (source: env (MELODEX_MATCHER_POPULARITY_WEIGHT))",
                "- matcher.match_weight = 0.7 (source: default)",
                "- index.extra_stopwords = chorus,verse (source: env (MELODEX_INDEX_EXTRA_STOPWORDS))",
                "- logging.level = warn (source: env (MELODEX_LOG_LEVEL))",
            ] {
                assert!(output.lines().any(|line| line == expected), "missing `{expected}`: {output}");
            }

            let options = LoadOptions {
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            };
            let output = config::run(&options);
            let expected = "- logging.level = debug (source: override (--log-level))";
            assert!(output.lines().any(|line| line == expected), "{output}");
        },
    );
}

#[test]
fn config_reports_file_sources() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("melodex.toml");
    fs::write(&path, "[similarity]\ndefault_k = 4\n").expect("write config");
    let options = LoadOptions {
        config_path: Some(path.clone()),
        require_file: true,
        ..LoadOptions::default()
    };

    with_env(&[], || {
        let output = config::run(&options);
        let expected = format!("- similarity.default_k = 4 (source: file ({}))", path.display());
        assert!(output.lines().any(|line| line == expected), "{output}");
    });
}

#[test]
fn doctor_passes_with_a_readable_catalog() {
    let (_dir, options) = catalog_options(SONGS);
    with_env(&[], || {
        let result = doctor::run(&options, true);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let names: Vec<&str> = payload["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect();
        assert_eq!(names, vec!["config_validation", "catalog_readable", "index_build"]);
    });
}

#[test]
fn doctor_skips_later_checks_after_a_failure() {
    with_env(&[("MELODEX_INDEX_MIN_DF", "zero")], || {
        let result = doctor::run(&LoadOptions::default(), true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert_eq!(payload["checks"][2]["status"], "skipped");

        let human = doctor::run(&LoadOptions::default(), false);
        assert!(human.output.contains("- [skip] index_build"));
    });
}

fn catalog_options(contents: &str) -> (TempDir, LoadOptions) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("songs.json");
    fs::write(&path, contents).expect("write catalog");
    (dir, options_for(path))
}

fn options_for(path: PathBuf) -> LoadOptions {
    LoadOptions {
        overrides: ConfigOverrides { catalog_path: Some(path), ..ConfigOverrides::default() },
        ..LoadOptions::default()
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "MELODEX_CATALOG_PATH",
        "MELODEX_CATALOG_PRESET",
        "MELODEX_COMPOSER_HIGH_CUT",
        "MELODEX_COMPOSER_LOW_CUT",
        "MELODEX_INDEX_MAX_FEATURES",
        "MELODEX_INDEX_MIN_DF",
        "MELODEX_INDEX_MAX_DF",
        "MELODEX_INDEX_STOPWORDS",
        "MELODEX_INDEX_EXTRA_STOPWORDS",
        "MELODEX_SIMILARITY_DEFAULT_K",
        "MELODEX_MATCHER_DEFAULT_K",
        "MELODEX_MATCHER_WIDEN_MARGIN",
        "MELODEX_MATCHER_MATCH_WEIGHT",
        "MELODEX_MATCHER_POPULARITY_WEIGHT",
        "MELODEX_LOGGING_LEVEL",
        "MELODEX_LOGGING_FORMAT",
        "MELODEX_LOG_LEVEL",
        "MELODEX_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
