//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Fu.
//! The Fu project belongs to the Dunimd project team.

use fu::dsl;
use fu::errors::FuError;

#[test]
fn plain_path_has_no_commands() {
    let parsed = dsl::parse("report.pdf").unwrap();
    assert_eq!(parsed.path, "report.pdf");
    assert!(parsed.commands.is_empty());
    assert!(parsed.warnings.is_empty());
}

#[test]
fn commands_parse_in_written_order() {
    let parsed = dsl::parse("report.pdf[pages:1-3,images:false]").unwrap();
    assert_eq!(parsed.path, "report.pdf");
    let keys: Vec<&str> = parsed.commands.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["pages", "images"]);
    assert_eq!(parsed.commands.get("pages").map(String::as_str), Some("1-3"));
    assert_eq!(parsed.commands.get("images").map(String::as_str), Some("false"));
}

#[test]
fn whitespace_trims_around_separators_only() {
    let parsed = dsl::parse("a.txt[ key : a b c , other : x ]").unwrap();
    assert_eq!(parsed.commands.get("key").map(String::as_str), Some("a b c"));
    assert_eq!(parsed.commands.get("other").map(String::as_str), Some("x"));
}

#[test]
fn escapes_cover_bracket_comma_backslash() {
    let parsed = dsl::parse(r"a.txt[sep:one\,two,tail:x\]y,slash:a\\b]").unwrap();
    assert_eq!(parsed.commands.get("sep").map(String::as_str), Some("one,two"));
    assert_eq!(parsed.commands.get("tail").map(String::as_str), Some("x]y"));
    assert_eq!(parsed.commands.get("slash").map(String::as_str), Some(r"a\b"));
}

#[test]
fn quoted_values_preserve_brackets_and_commas() {
    let parsed = dsl::parse("page.html[select:'div[2], span',images:false]").unwrap();
    assert_eq!(
        parsed.commands.get("select").map(String::as_str),
        Some("div[2], span")
    );
    assert_eq!(parsed.commands.get("images").map(String::as_str), Some("false"));
}

#[test]
fn duplicate_keys_last_wins_with_warning() {
    let parsed = dsl::parse("a.txt[pages:1,pages:2]").unwrap();
    assert_eq!(parsed.commands.get("pages").map(String::as_str), Some("2"));
    assert_eq!(parsed.warnings.len(), 1);
    assert!(parsed.warnings[0].contains("duplicate"));
}

#[test]
fn unterminated_group_reports_offset() {
    let err = dsl::parse("a.txt[pages:1").unwrap_err();
    match err {
        FuError::DslSyntax { offset, .. } => assert_eq!(offset, 5),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_colon_is_a_syntax_error() {
    let err = dsl::parse("a.txt[pages]").unwrap_err();
    assert!(matches!(err, FuError::DslSyntax { .. }));
}

#[test]
fn empty_key_is_a_syntax_error() {
    let err = dsl::parse("a.txt[:value]").unwrap_err();
    assert!(matches!(err, FuError::DslSyntax { .. }));
}

#[test]
fn unescaped_bracket_inside_value_is_rejected() {
    let err = dsl::parse("a.txt[select:div[2]]").unwrap_err();
    assert!(matches!(err, FuError::DslSyntax { .. }));
}

#[test]
fn emit_then_parse_round_trips() {
    let cases = [
        "plain.txt",
        "report.pdf[pages:1-3,images:false]",
        r"a.txt[sep:one\,two]",
        "b.csv[limit:10,note:hello world]",
    ];
    for source in cases {
        let parsed = dsl::parse(source).unwrap();
        let emitted = dsl::emit(&parsed.path, &parsed.commands);
        let reparsed = dsl::parse(&emitted).unwrap();
        assert_eq!(reparsed.path, parsed.path, "path drift for {source}");
        assert_eq!(reparsed.commands, parsed.commands, "commands drift for {source}");
    }
}

#[test]
fn escaped_brackets_in_the_path_unescape() {
    let parsed = dsl::parse(r"weird\[1\].pdf").unwrap();
    assert_eq!(parsed.path, "weird[1].pdf");
    assert!(parsed.commands.is_empty());
}

#[test]
fn escaped_path_brackets_compose_with_a_command_group() {
    let parsed = dsl::parse(r"weird\[1\].pdf[pages:2]").unwrap();
    assert_eq!(parsed.path, "weird[1].pdf");
    assert_eq!(parsed.commands.get("pages").map(String::as_str), Some("2"));
}

#[test]
fn windows_separators_in_paths_stay_literal() {
    let parsed = dsl::parse(r"C:\dir\file.txt[limit:3]").unwrap();
    assert_eq!(parsed.path, r"C:\dir\file.txt");
    assert_eq!(parsed.commands.get("limit").map(String::as_str), Some("3"));
}

#[test]
fn emit_escapes_path_brackets_for_round_trip() {
    let mut commands = fu::FuCommands::new();
    commands.insert("pages".to_string(), "1".to_string());

    let emitted = dsl::emit("weird[1].pdf", &commands);
    assert_eq!(emitted, r"weird\[1\].pdf[pages:1]");

    let parsed = dsl::parse(&emitted).unwrap();
    assert_eq!(parsed.path, "weird[1].pdf");
    assert_eq!(parsed.commands, commands);

    // Without commands the escaped form still round-trips.
    let bare = dsl::emit("weird[1].pdf", &fu::FuCommands::new());
    assert_eq!(dsl::parse(&bare).unwrap().path, "weird[1].pdf");
}

#[test]
fn chunk_ids_parse_as_paths() {
    let parsed = dsl::parse("doc.txt#paragraphs-2[tokens:100]").unwrap();
    assert_eq!(parsed.path, "doc.txt#paragraphs-2");
    assert_eq!(parsed.commands.get("tokens").map(String::as_str), Some("100"));
}
