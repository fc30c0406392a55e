//! Similarity scoring: token-sort ratio and Jaro-Winkler, both scaled to
//! integers in [0, 100] so thresholds compare without floating point.

use crate::constants::{
    BROAD_SEARCH_LIMIT, RISKY_FUZZY_MATCH_PERCENTAGE, SAFE_FUZZY_MATCH_PERCENTAGE,
};
use crate::index::ProgramIndex;

/// The two scores every comparison yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchScores {
    pub token_sort: i32,
    pub jaro_winkler: i32,
}

impl MatchScores {
    pub fn compute(a: &str, b: &str) -> Self {
        Self {
            token_sort: token_sort_ratio(a, b),
            jaro_winkler: jaro_winkler_score(a, b),
        }
    }

    /// Either metric clears the safe threshold.
    pub fn is_safe(&self) -> bool {
        self.token_sort >= SAFE_FUZZY_MATCH_PERCENTAGE
            || self.jaro_winkler >= SAFE_FUZZY_MATCH_PERCENTAGE
    }

    /// Both metrics clear the risky threshold.
    pub fn is_risky(&self) -> bool {
        self.token_sort >= RISKY_FUZZY_MATCH_PERCENTAGE
            && self.jaro_winkler >= RISKY_FUZZY_MATCH_PERCENTAGE
    }

    pub fn is_perfect(&self) -> bool {
        self.token_sort >= 100 || self.jaro_winkler >= 100
    }
}

/// Lowercase, strip everything but letters, digits and spaces, collapse
/// whitespace.
fn normalize(input: &str) -> String {
    let mut cleaned = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_alphanumeric() {
            cleaned.extend(c.to_lowercase());
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn sorted_tokens(input: &str) -> String {
    let normalized = normalize(input);
    let mut tokens: Vec<&str> = normalized.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Indel distance: Levenshtein where a substitution costs two edits. The
/// similarity ratio derived from it matches the classic fuzz ratio.
fn indel_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let len_a = a_chars.len();
    let len_b = b_chars.len();

    let mut matrix = vec![vec![0usize; len_b + 1]; len_a + 1];
    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=len_b {
        matrix[0][j] = j;
    }

    for i in 1..=len_a {
        for j in 1..=len_b {
            let substitution = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 2 };
            matrix[i][j] = (matrix[i - 1][j] + 1)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j - 1] + substitution);
        }
    }

    matrix[len_a][len_b]
}

/// Token-sort ratio in [0, 100]: both sides are normalised, their tokens
/// sorted, and the results compared with an indel ratio.
pub fn token_sort_ratio(a: &str, b: &str) -> i32 {
    let a_sorted = sorted_tokens(a);
    let b_sorted = sorted_tokens(b);

    let combined_len = a_sorted.chars().count() + b_sorted.chars().count();
    if combined_len == 0 {
        return 0;
    }

    let distance = indel_distance(&a_sorted, &b_sorted);
    (100.0 * (1.0 - distance as f64 / combined_len as f64)).round() as i32
}

/// Jaro-Winkler similarity rounded to two decimals and scaled to [0, 100].
pub fn jaro_winkler_score(a: &str, b: &str) -> i32 {
    (strsim::jaro_winkler(a, b) * 100.0).round() as i32
}

/// Broad search over the index keys: for every query string take the
/// `BROAD_SEARCH_LIMIT` best keys by token-sort ratio, deduplicate keeping
/// each key's maximum score, and order by descending score.
pub fn broad_search(index: &ProgramIndex, queries: &[String]) -> Vec<(String, i32)> {
    use std::collections::HashMap;

    let mut best_scores: HashMap<&str, i32> = HashMap::new();

    for query in queries {
        let mut scored: Vec<(&str, i32)> = index
            .keys()
            .map(|key| (key, token_sort_ratio(query, key)))
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        for (key, score) in scored.into_iter().take(BROAD_SEARCH_LIMIT) {
            let entry = best_scores.entry(key).or_insert(score);
            if *entry < score {
                *entry = score;
            }
        }
    }

    let mut results: Vec<(String, i32)> = best_scores
        .into_iter()
        .map(|(key, score)| (key.to_string(), score))
        .collect();
    results.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    results
}
