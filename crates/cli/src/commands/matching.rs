use melodex_core::config::LoadOptions;
use melodex_core::{
    FeatureWeights, FeatureWindow, FeatureWindows, KeywordFilter, RangeQuery, RangeRecommendations,
};
use serde::Serialize;

use super::{load_engine, CommandResult, EXIT_INVALID_INPUT};
use crate::presets::{mood_profile, weather_profile, Mood, SignalProfile, WeatherCondition};

const COMMAND: &str = "match";

#[derive(Clone, Debug, Default)]
pub struct MatchArgs {
    pub weather: Option<String>,
    pub temperature: Option<f64>,
    pub mood: Option<String>,
    /// `feature=min:max`; overrides the preset window for that feature.
    pub windows: Vec<String>,
    /// `feature=weight`
    pub weights: Vec<String>,
    /// `field=word[,word]`; replaces the preset filter on that field.
    pub keywords: Vec<String>,
    /// `field=value`
    pub prefer: Option<String>,
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct MatchData {
    signal: Option<String>,
    mood: Option<&'static str>,
    requested_windows: FeatureWindows,
    requested_keywords: Vec<KeywordFilter>,
    #[serde(flatten)]
    result: RangeRecommendations,
}

pub fn run(options: &LoadOptions, args: &MatchArgs) -> CommandResult {
    let (profile, signal) = match resolve_profile(args) {
        Ok(resolved) => resolved,
        Err(message) => {
            return CommandResult::failure(COMMAND, "invalid_input", message, EXIT_INVALID_INPUT)
        }
    };
    let query = match build_query(profile.as_ref(), args) {
        Ok(query) => query,
        Err(message) => {
            return CommandResult::failure(COMMAND, "invalid_input", message, EXIT_INVALID_INPUT)
        }
    };

    let (config, recommender) = match load_engine(COMMAND, options) {
        Ok(engine) => engine,
        Err(failure) => return failure,
    };
    let query = RangeQuery { k: args.k.unwrap_or(config.matcher.default_k), ..query };

    let result = recommender.match_ranges(&query);
    let message = if result.widened {
        format!("{} songs after widening the windows", result.recommendations.len())
    } else {
        format!("{} songs inside the requested windows", result.recommendations.len())
    };

    CommandResult::success_with_data(
        COMMAND,
        message,
        MatchData {
            signal,
            mood: profile.as_ref().map(|profile| profile.mood),
            requested_windows: query.windows,
            requested_keywords: query.keyword_filters,
            result,
        },
    )
}

fn resolve_profile(args: &MatchArgs) -> Result<(Option<SignalProfile>, Option<String>), String> {
    if let Some(mood) = &args.mood {
        let mood: Mood = mood.parse()?;
        return Ok((Some(mood_profile(mood)), Some(format!("mood:{mood}"))));
    }
    if let Some(weather) = &args.weather {
        let condition = WeatherCondition::from_label(weather);
        let signal = match args.temperature {
            Some(celsius) => format!("weather:{condition:?}@{celsius}C"),
            None => format!("weather:{condition:?}"),
        };
        return Ok((Some(weather_profile(condition, args.temperature)), Some(signal)));
    }
    Ok((None, None))
}

fn build_query(profile: Option<&SignalProfile>, args: &MatchArgs) -> Result<RangeQuery, String> {
    let mut windows: FeatureWindows =
        profile.map(|profile| profile.windows.clone()).unwrap_or_default();
    let mut weights: FeatureWeights =
        profile.map(|profile| profile.weights.clone()).unwrap_or_default();

    for entry in &args.windows {
        let (feature, window) = parse_window(entry)?;
        windows.insert(feature, window);
    }
    for entry in &args.weights {
        let (feature, raw) = split_pair(entry, "--weight")?;
        let weight = raw
            .parse::<f64>()
            .ok()
            .filter(|weight| weight.is_finite() && *weight >= 0.0)
            .ok_or_else(|| format!("--weight `{entry}` needs a non-negative number"))?;
        weights.insert(feature, weight);
    }

    let mut keyword_filters: Vec<KeywordFilter> =
        profile.map(|profile| profile.keywords.clone()).unwrap_or_default();
    for entry in &args.keywords {
        let (field, words) = split_pair(entry, "--keyword")?;
        keyword_filters.retain(|filter| !filter.field.eq_ignore_ascii_case(&field));
        keyword_filters.push(KeywordFilter::new(field, words.split(',')));
    }

    if windows.is_empty() && keyword_filters.is_empty() {
        return Err("give --mood, --weather, --window or --keyword".to_string());
    }

    let mut query = RangeQuery::new(windows, weights, 0);
    query.keyword_filters = keyword_filters;
    if let Some(prefer) = &args.prefer {
        let (field, value) = split_pair(prefer, "--prefer")?;
        query = query.with_preference(field, value);
    }
    Ok(query)
}

fn parse_window(entry: &str) -> Result<(String, FeatureWindow), String> {
    let (feature, bounds) = split_pair(entry, "--window")?;
    let parsed = bounds.split_once(':').and_then(|(min, max)| {
        let min = min.trim().parse::<f64>().ok()?;
        let max = max.trim().parse::<f64>().ok()?;
        (min.is_finite() && max.is_finite()).then_some((min, max))
    });
    let (min, max) =
        parsed.ok_or_else(|| format!("--window `{entry}` must look like feature=min:max"))?;
    Ok((feature, FeatureWindow::new(min, max)))
}

fn split_pair(entry: &str, flag: &str) -> Result<(String, String), String> {
    match entry.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("{flag} `{entry}` must look like key=value")),
    }
}

#[cfg(test)]
mod tests {
    use super::{build_query, parse_window, resolve_profile, MatchArgs};

    #[test]
    fn explicit_windows_override_the_mood_profile() {
        let args = MatchArgs {
            mood: Some("happy".to_string()),
            windows: vec!["energy=0.1:0.2".to_string(), "tempo=90:120".to_string()],
            weights: vec!["tempo=0.5".to_string()],
            prefer: Some("language=Hindi".to_string()),
            ..MatchArgs::default()
        };
        let (profile, signal) = resolve_profile(&args).expect("mood resolves");
        assert_eq!(signal.as_deref(), Some("mood:happy"));

        let query = build_query(profile.as_ref(), &args).expect("query builds");
        assert_eq!(query.windows["energy"].max, 0.2);
        assert_eq!(query.windows["tempo"].min, 90.0);
        assert_eq!(query.weights["tempo"], 0.5);
        assert_eq!(query.windows.len(), 4);
        let preference = query.preference.expect("preference parsed");
        assert_eq!((preference.field.as_str(), preference.value.as_str()), ("language", "Hindi"));
    }

    #[test]
    fn explicit_keywords_replace_the_weather_filter_for_that_field() {
        let args = MatchArgs {
            weather: Some("rain".to_string()),
            keywords: vec!["genre=Lo-Fi, chill".to_string(), "lyrics=storm".to_string()],
            ..MatchArgs::default()
        };
        let (profile, _) = resolve_profile(&args).expect("weather resolves");
        let query = build_query(profile.as_ref(), &args).expect("query builds");

        let fields: Vec<&str> =
            query.keyword_filters.iter().map(|filter| filter.field.as_str()).collect();
        assert_eq!(fields, vec!["mood", "genre", "lyrics"]);
        assert_eq!(query.keyword_filters[1].keywords, vec!["lo-fi", "chill"]);
    }

    #[test]
    fn keywords_alone_make_a_query() {
        let args = MatchArgs { keywords: vec!["mood=happy".to_string()], ..MatchArgs::default() };
        let query = build_query(None, &args).expect("keyword-only query");
        assert!(query.windows.is_empty());
        assert_eq!(query.keyword_filters.len(), 1);
    }

    #[test]
    fn a_signal_or_window_is_required() {
        let args = MatchArgs::default();
        let (profile, _) = resolve_profile(&args).expect("no profile");
        assert!(build_query(profile.as_ref(), &args).is_err());
    }

    #[test]
    fn malformed_windows_are_rejected() {
        assert!(parse_window("energy=high").is_err());
        assert!(parse_window("=0.1:0.2").is_err());
        let (_, window) = parse_window("energy=0.9:0.4").expect("swapped bounds parse");
        assert_eq!((window.min, window.max), (0.4, 0.9));
    }
}
