use super::stopwords::StopWords;

/// Lower-cases and splits on anything that is not alphanumeric or `_`, keeping
/// tokens of two or more characters that are not stopwords.
pub fn tokenize(text: &str, stop_words: &StopWords) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
        .filter(|token| token.chars().count() >= 2)
        .filter(|token| !stop_words.contains(token))
        .map(str::to_owned)
        .collect()
}

/// n-grams for every `n` in `range`, in ascending `n` then position order.
pub fn ngrams(tokens: &[String], range: (usize, usize)) -> Vec<String> {
    let (min_n, max_n) = (range.0.max(1), range.1.max(range.0.max(1)));
    let mut terms = Vec::new();
    for n in min_n..=max_n {
        if n == 1 {
            terms.extend(tokens.iter().cloned());
            continue;
        }
        terms.extend(tokens.windows(n).map(|window| window.join(" ")));
    }
    terms
}
