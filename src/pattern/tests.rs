//! Unit tests for stem and regex target patterns.

use super::*;
use rstest::rstest;

fn stem_pattern(text: &str) -> TargetPattern {
    TargetPattern::parse(text, false)
        .expect("valid pattern")
        .expect("stem marker")
}

#[rstest]
#[case("%.o", "main.o", Some("main"))]
#[case("%.o", "src/main.o", Some("src/main"))]
#[case("%.o", ".o", None)]
#[case("%.o", "main.c", None)]
#[case("lib%.a", "libz.a", Some("z"))]
#[case("lib%.a", "lib.a", None)]
#[case("&.o", "main.o", Some("main"))]
#[case("&.o", "src/main.o", None)]
#[case("&.o", "a.b.o", None)]
fn stem_matching(#[case] pattern: &str, #[case] name: &str, #[case] stem: Option<&str>) {
    let matched = stem_pattern(pattern).matches(name, false);
    assert_eq!(matched, stem.map(|s| Stem::Text(s.to_owned())));
}

#[test]
fn empty_stem_requires_opt_in() {
    let pattern = stem_pattern("%.o");
    assert!(pattern.matches(".o", false).is_none());
    assert_eq!(pattern.matches(".o", true), Some(Stem::Text(String::new())));
}

#[test]
fn plain_names_are_not_patterns() {
    assert!(TargetPattern::parse("main.o", false).expect("parse").is_none());
}

#[test]
fn multiple_markers_are_rejected() {
    let err = TargetPattern::parse("%/%.o", false).expect_err("two markers");
    assert!(matches!(err, PatternError::MultipleStems(text) if text == "%/%.o"));
}

#[test]
fn regex_is_anchored() {
    let pattern = TargetPattern::parse(r"(.*)\.o", true)
        .expect("valid regex")
        .expect("regex pattern");
    assert!(pattern.matches("x.o.bak", false).is_none());
    let stem = pattern.matches("dir/x.o", false).expect("match");
    assert_eq!(stem.primary(), "dir/x");
    assert_eq!(stem.instantiate(r"\1.c \0.d"), "dir/x.c dir/x.o.d");
}

#[test]
fn invalid_regex_reports_source() {
    let err = TargetPattern::parse("(unclosed", true).expect_err("invalid");
    assert!(matches!(err, PatternError::Regex { pattern, .. } if pattern == "(unclosed"));
}

#[test]
fn stem_recipes_are_left_untouched() {
    let stem = Stem::Text("main".into());
    assert_eq!(stem.instantiate("%.c %.h"), "main.c main.h");
    assert_eq!(
        stem.instantiate_recipe("printf '%s\\n' $stem"),
        "printf '%s\\n' $stem"
    );
}

#[test]
fn regex_recipes_receive_captures() {
    let stem = Stem::Captures(vec![Some("a-b".into()), Some("a".into()), Some("b".into())]);
    assert_eq!(stem.instantiate_recipe(r"cat \1 \2 > \0"), "cat a b > a-b");
    assert_eq!(stem.groups(), vec!["a-b", "a", "b"]);
}

#[test]
fn missing_capture_groups_expand_to_nothing() {
    let stem = Stem::Captures(vec![Some("x".into()), None]);
    assert_eq!(stem.instantiate(r"[\1][\7]"), "[][]");
    assert_eq!(stem.primary(), "");
}
