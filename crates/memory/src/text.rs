//! Lightweight text heuristics: term sets, naive entity spotting, labels.

use std::collections::{BTreeSet, HashMap};

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "from", "was", "are", "have", "what", "when",
    "where", "which", "about", "your", "would", "could", "should", "there", "their", "them",
    "they", "will", "just", "into", "than", "then", "been", "were",
];

/// Capitalized words that start sentences far more often than they name things.
const COMMON_CAPITALIZED: &[&str] = &[
    "I", "A", "An", "The", "What", "When", "Where", "Who", "Why", "How", "Can", "Could",
    "Would", "Should", "Is", "Are", "Do", "Does", "Did", "Please", "Hi", "Hello", "Hey",
    "Thanks", "Yes", "No", "It", "My", "We", "You", "This", "That", "And", "But", "Also",
];

fn clean(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Every lowercased word, short ones and stopwords included.
pub fn words(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(|w| clean(w).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Lowercased content terms longer than three characters.
pub fn terms(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(|w| clean(w).to_lowercase())
        .filter(|w| w.chars().count() > 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Fraction of `query` terms present in `candidate`.
pub fn overlap(query: &BTreeSet<String>, candidate: &BTreeSet<String>) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    query.intersection(candidate).count() as f32 / query.len() as f32
}

/// Capitalized words, deduplicated in order of first appearance.
pub fn capitalized_terms(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    text.split_whitespace()
        .map(clean)
        .filter(|w| {
            w.chars().count() > 1
                && w.chars().next().is_some_and(char::is_uppercase)
                && !COMMON_CAPITALIZED.contains(w)
        })
        .filter(|w| seen.insert(w.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// A short label from the most frequent terms across `texts`.
pub fn label<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for term in terms(text) {
            *freq.entry(term).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<_> = freq.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let top: Vec<String> = sorted
        .into_iter()
        .take(3)
        .map(|(w, _)| {
            let mut c = w.chars();
            match c.next() {
                None => String::new(),
                Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
            }
        })
        .collect();

    if top.is_empty() {
        "Cluster".to_string()
    } else {
        top.join(" ")
    }
}
