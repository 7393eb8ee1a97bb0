// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use yare::parameterized;

use super::*;

#[test]
fn normalize_collapses_whitespace_and_case() {
    assert_eq!(normalize_for_id("  Fix   the\tLogin  Bug! "), "fix the login bug!");
    assert_eq!(normalize_for_id("a_b(c)[d]"), "abcd");
}

#[test]
fn content_id_is_stable_and_normalization_invariant() {
    let a = content_id("Fix the flaky login test");
    let b = content_id("  fix THE flaky   login test ");
    assert_eq!(a, b);
    assert_eq!(a.len(), 8);
    assert_ne!(a, content_id("fix the flaky logout test"));
}

#[parameterized(
    identical = { "abc", "abc", 0 },
    one_sub = { "abc", "abd", 1 },
    insert = { "abc", "abxc", 1 },
    delete = { "abc", "ac", 1 },
    empty_left = { "", "abc", 3 },
    empty_right = { "abc", "", 3 },
    full = { "kitten", "sitting", 3 },
)]
fn levenshtein_cases(a: &str, b: &str, expected: usize) {
    assert_eq!(levenshtein(a, b), expected);
}

#[test]
fn dice_similarity_behaves() {
    assert!((bigram_dice("night", "nacht") - 0.25).abs() < 1e-9);
    assert!((bigram_dice("abc", "abc") - 1.0).abs() < 1e-9);
    assert_eq!(bigram_dice("ab", "xy"), 0.0);
    assert_eq!(bigram_dice("", ""), 1.0);
    assert_eq!(bigram_dice("a", "ab"), 0.0);
}

#[test]
fn hybrid_takes_the_larger_score() {
    let a = "fix login test";
    let b = "fix login tests";
    let hybrid = hybrid_similarity(a, b);
    assert!(hybrid >= levenshtein_similarity(a, b));
    assert!(hybrid >= bigram_dice(a, b));
}

#[parameterized(
    short = { 10, 0.95 },
    edge_short = { 29, 0.95 },
    mid = { 30, 0.90 },
    edge_mid = { 59, 0.90 },
    long = { 60, 0.85 },
)]
fn thresholds_by_length(len: usize, expected: f64) {
    assert!((dedup_threshold(len) - expected).abs() < 1e-9);
}

#[test]
fn fuzzy_phrase_matching_folds_separators() {
    assert!(is_fuzzy_phrase_match("DONE_TOKEN", "done token", 2));
    assert!(is_fuzzy_phrase_match("all-tests.pass", "ALL TESTS PASS", 2));
    assert!(is_fuzzy_phrase_match("MIGRATION_COMPLETE", "MIGRATION_COMPLET", 2));
    assert!(!is_fuzzy_phrase_match("MIGRATION_COMPLETE", "SOMETHING_ELSE", 2));
    assert!(!is_fuzzy_phrase_match("abcdef", "abcxyz", 2));
}
