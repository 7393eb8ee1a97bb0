// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const SCREEN_LS: &str = "\
There are screens on:
\t12345.cm-abc12345\t(Detached)
\t12346.cm-def67890\t(Attached)
\t999.other-session\t(Detached)
3 Sockets in /run/screen/S-user.
";

#[test]
fn list_parses_prefix_matches() {
    let windows = parse_screen_list(SCREEN_LS, "cm-");
    assert_eq!(
        windows,
        vec![
            WindowInfo { pid: 12345, name: "cm-abc12345".into() },
            WindowInfo { pid: 12346, name: "cm-def67890".into() },
        ]
    );
}

#[test]
fn list_ignores_headers_and_foreign_names() {
    let windows = parse_screen_list(SCREEN_LS, "zz-");
    assert!(windows.is_empty());
}

#[test]
fn list_handles_no_sessions_output() {
    let text = "No Sockets found in /run/screen/S-user.\n";
    assert!(parse_screen_list(text, "cm-").is_empty());
}

#[test]
fn list_tolerates_garbage_lines() {
    // "abc" is not a pid; the entry must be skipped.
    assert!(parse_screen_list("\tabc.cm-x\t(Detached)\n", "cm-").is_empty());
}

#[test]
fn capture_paths_are_per_window() {
    let tool = ScreenTool::new("/tmp/cm-capture");
    assert_eq!(tool.capture_path("cm-abc"), PathBuf::from("/tmp/cm-capture/cm-abc.log"));
    assert_eq!(tool.capture_path("cm-def"), PathBuf::from("/tmp/cm-capture/cm-def.log"));
}

#[test]
fn pid_alive_self() {
    assert!(pid_alive(std::process::id()));
    // Pid beyond i32 range can never be probed.
    assert!(!pid_alive(u32::MAX));
}
