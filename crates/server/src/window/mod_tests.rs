// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use yare::parameterized;

use super::*;

#[parameterized(
    simple = { "cm-abc123" },
    dots = { "cm-a.b_c-d" },
    single = { "x" },
)]
fn valid_names_accepted(name: &str) {
    assert!(validate_window_name(name).is_ok());
}

#[parameterized(
    empty = { "" },
    space = { "cm session" },
    semicolon = { "cm;rm" },
    slash = { "cm/abc" },
    unicode = { "cm-é" },
)]
fn invalid_names_rejected(name: &str) {
    assert!(validate_window_name(name).is_err());
}

#[test]
fn long_name_rejected() {
    let name = "a".repeat(65);
    assert!(validate_window_name(&name).is_err());
    let name = "a".repeat(64);
    assert!(validate_window_name(&name).is_ok());
}

#[test]
fn relative_dir_rejected() {
    assert!(validate_working_dir(Path::new("work/dir")).is_err());
    assert!(validate_working_dir(Path::new("/work/dir")).is_ok());
}

#[parameterized(
    semicolon = { "/tmp/x;rm -rf /" },
    pipe = { "/tmp/x|y" },
    dollar = { "/tmp/$HOME" },
    backtick = { "/tmp/`id`" },
    quote = { "/tmp/it's" },
    newline = { "/tmp/a\nb" },
)]
fn metacharacter_dirs_rejected(path: &str) {
    assert!(validate_working_dir(Path::new(path)).is_err());
}

#[test]
fn sanitize_strips_controls_and_replacement() {
    let raw = b"ok\x07bell\x00nul\tkeep\ttabs\r\n\xff\xfe";
    let out = sanitize_snapshot(raw, false);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, "okbellnul\tkeep\ttabs\r\n");
}

#[test]
fn sanitize_substitutes_emoji() {
    let raw = "✅ done ☐ todo ◐ busy → next".as_bytes();
    let out = sanitize_snapshot(raw, true);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, "[ok] done [ ] todo [~] busy -> next");
}

#[test]
fn sanitize_keeps_emoji_without_substitution() {
    let raw = "☐ todo".as_bytes();
    let out = sanitize_snapshot(raw, false);
    assert_eq!(String::from_utf8(out).unwrap(), "☐ todo");
}
