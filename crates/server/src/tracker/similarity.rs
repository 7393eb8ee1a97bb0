// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text normalization and similarity primitives for todo dedup and
//! completion-phrase fuzzy matching.

/// Normalized form used for content-derived todo ids: lowercase, whitespace
/// collapsed, non-alphanumeric removed except basic punctuation.
pub fn normalize_for_id(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last_space = true;
    for c in content.chars() {
        let c = if c.is_whitespace() { ' ' } else { c };
        if c == ' ' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
            continue;
        }
        if c.is_alphanumeric() || matches!(c, '.' | ',' | '!' | '?' | '-') {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
        }
    }
    out.trim_end().to_string()
}

/// Stable content-derived id: djb2-xor over the normalized form, hex-encoded.
pub fn content_id(content: &str) -> String {
    let normalized = normalize_for_id(content);
    let mut hash: u32 = 5381;
    for b in normalized.bytes() {
        hash = hash.wrapping_mul(33) ^ u32::from(b);
    }
    format!("{hash:08x}")
}

/// Normalization for completion-phrase comparison: case, whitespace, and
/// `_`/`-`/`.` are all folded away.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '_' | '-' | '.'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Classic Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (prev[j + 1] + 1).min(current[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// Levenshtein similarity scaled to `[0,1]`.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Sørensen–Dice coefficient over character bigrams.
pub fn bigram_dice(a: &str, b: &str) -> f64 {
    let bigrams = |s: &str| -> Vec<(char, char)> {
        let chars: Vec<char> = s.chars().collect();
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    };
    let mut a_grams = bigrams(a);
    let b_grams = bigrams(b);
    if a_grams.is_empty() && b_grams.is_empty() {
        return 1.0;
    }
    if a_grams.is_empty() || b_grams.is_empty() {
        return 0.0;
    }

    let total = a_grams.len() + b_grams.len();
    let mut matches = 0usize;
    for gram in &b_grams {
        if let Some(pos) = a_grams.iter().position(|g| g == gram) {
            a_grams.swap_remove(pos);
            matches += 1;
        }
    }
    2.0 * matches as f64 / total as f64
}

/// Hybrid similarity: the more generous of normalized Levenshtein and
/// bigram Dice.
pub fn hybrid_similarity(a: &str, b: &str) -> f64 {
    levenshtein_similarity(a, b).max(bigram_dice(a, b))
}

/// Length-dependent dedup threshold: short strings must match almost
/// exactly, long ones get more slack.
pub fn dedup_threshold(normalized_len: usize) -> f64 {
    if normalized_len < 30 {
        0.95
    } else if normalized_len < 60 {
        0.90
    } else {
        0.85
    }
}

/// Fuzzy completion-phrase match: normalized forms within `max_distance`
/// Levenshtein steps.
pub fn is_fuzzy_phrase_match(a: &str, b: &str, max_distance: usize) -> bool {
    let a = normalize_phrase(a);
    let b = normalize_phrase(b);
    if a.is_empty() || b.is_empty() {
        return a == b;
    }
    levenshtein(&a, &b) <= max_distance
}

#[cfg(test)]
#[path = "similarity_tests.rs"]
mod tests;
