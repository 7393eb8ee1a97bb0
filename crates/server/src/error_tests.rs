// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn codes_are_stable() {
    let cases: Vec<(SupervisorError, &str)> = vec![
        (SupervisorError::Validation { what: "window name", detail: "bad".into() }, "VALIDATION"),
        (SupervisorError::Unavailable("no screen".into()), "UNAVAILABLE"),
        (
            SupervisorError::WindowCreate { name: "cm-1".into(), detail: "exit 1".into() },
            "WINDOW_CREATE",
        ),
        (SupervisorError::Inject { name: "cm-1".into(), attempts: 3 }, "INJECT"),
        (SupervisorError::Parse("bad block".into()), "PARSE"),
        (SupervisorError::Persistence("disk full".into()), "PERSISTENCE"),
        (SupervisorError::Internal("oops".into()), "INTERNAL"),
    ];
    for (err, code) in cases {
        assert_eq!(err.code(), code);
    }
}

#[test]
fn inject_and_unavailable_are_transient() {
    assert!(SupervisorError::Inject { name: "cm-1".into(), attempts: 3 }.is_transient());
    assert!(SupervisorError::Unavailable("no screen".into()).is_transient());
    assert!(!SupervisorError::Parse("x".into()).is_transient());
    assert!(
        !SupervisorError::Validation { what: "window name", detail: "bad".into() }.is_transient()
    );
}

#[test]
fn display_includes_context() {
    let err = SupervisorError::WindowCreate { name: "cm-abc".into(), detail: "timeout".into() };
    let msg = err.to_string();
    assert!(msg.contains("cm-abc"));
    assert!(msg.contains("timeout"));
}
