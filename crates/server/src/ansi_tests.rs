// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn plain_text_passes_through() {
    assert_eq!(ansi_strip(b"hello world\n"), b"hello world\n");
}

#[test]
fn csi_sequences_removed() {
    assert_eq!(ansi_strip(b"\x1b[31mred\x1b[0m"), b"red");
    assert_eq!(ansi_strip(b"\x1b[2J\x1b[Hcleared"), b"cleared");
    // Multi-parameter SGR
    assert_eq!(ansi_strip(b"\x1b[1;32;44mstyled\x1b[m"), b"styled");
}

#[test]
fn osc_sequences_removed() {
    // BEL-terminated title set
    assert_eq!(ansi_strip(b"\x1b]0;my title\x07text"), b"text");
    // ST-terminated
    assert_eq!(ansi_strip(b"\x1b]8;;http://x\x1b\\link"), b"link");
}

#[test]
fn dcs_sequences_removed() {
    assert_eq!(ansi_strip(b"\x1bPq payload\x1b\\after"), b"after");
}

#[test]
fn two_byte_escapes_removed() {
    assert_eq!(ansi_strip(b"\x1b=keypad\x1b>done"), b"keypaddone");
    // Charset selection consumes one more byte
    assert_eq!(ansi_strip(b"\x1b(Bascii"), b"ascii");
}

#[test]
fn trailing_escape_dropped() {
    assert_eq!(ansi_strip(b"abc\x1b"), b"abc");
    assert_eq!(ansi_strip(b"abc\x1b["), b"abc");
}

#[test]
fn str_wrapper() {
    assert_eq!(ansi_strip_str("\u{1b}[33mIteration 3/50\u{1b}[0m"), "Iteration 3/50");
}

#[test]
fn interleaved_utf8_preserved() {
    let input = "before \u{1b}[35m☐ task\u{1b}[0m after";
    assert_eq!(ansi_strip_str(input), "before ☐ task after");
}
