//! Unit tests for the rule-file parser.

use super::*;
use crate::ast::RuleSet;
use crate::executor::{CommandOutput, ProcessShell, Shell, ShellProgram, WorkingContext};
use crate::pattern::TargetPattern;
use camino::Utf8PathBuf;
use miette::Diagnostic;
use rstest::rstest;
use std::io;

/// Prints a fixed rule-file fragment for `<|command` includes.
struct FragmentShell(&'static str);

impl Shell for FragmentShell {
    fn run(&self, _argv: &[String], _context: &WorkingContext) -> io::Result<CommandOutput> {
        Ok(CommandOutput {
            code: Some(0),
            output: self.0.as_bytes().to_vec(),
        })
    }
}

fn parse(text: &str) -> Result<RuleSet, ParseError> {
    parse_in(Utf8Path::new("."), text, VarTable::new())
}

fn parse_in(dir: &Utf8Path, text: &str, vars: VarTable) -> Result<RuleSet, ParseError> {
    let program = ShellProgram::default();
    let session = ShellSession::new(&ProcessShell, &program, dir);
    parse_str("mkfile", text, vars, session)
}

fn recipe_of<'r>(rules: &'r RuleSet, target: &str) -> Option<&'r str> {
    rules
        .explicit(target)
        .and_then(|t| t.recipe.as_ref())
        .map(Recipe::as_str)
}

#[test]
fn recipes_keep_text_and_drop_common_indent() {
    let text = "all: a b\n\techo one\n\t  echo $target\n\nb:\n\ttouch b\n";
    let rules = parse(text).expect("parse");
    assert_eq!(recipe_of(&rules, "all"), Some("echo one\n  echo $target"));
    assert_eq!(recipe_of(&rules, "b"), Some("touch b"));
    assert_eq!(rules.default_target(), Some("all"));
}

#[test]
fn unindented_comments_do_not_end_recipes() {
    let text = "all:\n\techo one\n# note\n\techo two\n";
    let rules = parse(text).expect("parse");
    assert_eq!(recipe_of(&rules, "all"), Some("echo one\necho two"));
}

#[test]
fn assignments_accumulate_and_expand_headers() {
    let text = "OBJ=a.o\nOBJ=$OBJ b.o\nprog: $OBJ\n\tcc -o $target $prereq\n";
    let rules = parse(text).expect("parse");
    let prog = rules.explicit("prog").expect("prog");
    assert_eq!(prog.prereqs, vec!["a.o", "b.o"]);
    assert_eq!(
        rules.variables().get("OBJ"),
        Some(&["a.o".to_owned(), "b.o".to_owned()][..])
    );
}

#[test]
fn locked_variables_survive_assignment() {
    let mut vars = VarTable::new();
    vars.lock("CC", vec!["clang".into()]);
    let rules = parse_in(Utf8Path::new("."), "CC=gcc\n", vars).expect("parse");
    assert_eq!(rules.variables().get("CC"), Some(&["clang".to_owned()][..]));
}

#[test]
fn continued_header_lines_are_joined() {
    let rules = parse("prog: a.o \\\n    b.o\n\tld\n").expect("parse");
    let prog = rules.explicit("prog").expect("prog");
    assert_eq!(prog.prereqs, vec!["a.o", "b.o"]);
}

#[test]
fn stem_and_regex_targets_become_meta_rules() {
    let text = "%.o: %.c\n\tcc -c $stem.c\n\n(.*)\\.a:R: \\1.o\n\tar r $target $prereq\n";
    let rules = parse(text).expect("parse");
    let meta = rules.meta_rules();
    assert_eq!(meta.len(), 2);
    assert!(matches!(
        meta.first().map(|rule| &rule.pattern),
        Some(TargetPattern::Stem { prefix, suffix, .. }) if prefix.is_empty() && suffix == ".o"
    ));
    let regex = meta.get(1).expect("regex rule");
    assert!(regex.attrs.regex);
    assert_eq!(regex.prereqs, vec![r"\1.o"]);
    assert_eq!(rules.default_target(), None);
}

#[test]
fn mixed_headers_split_into_explicit_and_meta_rules() {
    let rules = parse("all %.x:V:\n\techo $target\n").expect("parse");
    assert!(rules.explicit("all").is_some());
    assert_eq!(rules.meta_rules().len(), 1);
    assert_eq!(recipe_of(&rules, "all"), Some("echo $target"));
}

#[rstest]
#[case("\techo orphan\n", 1, "rmk::parse::syntax")]
#[case("a:\n\techo a\n\n\techo stray\n", 4, "rmk::parse::syntax")]
#[case("a:VQ b\n", 1, "rmk::parse::attributes")]
#[case("a:X: b\n", 1, "rmk::parse::attributes")]
#[case("%a%.o: x\n", 1, "rmk::parse::pattern")]
#[case("(:R: x\n", 1, "rmk::parse::pattern")]
#[case("a:\n\tx\n\na:\n\ty\n", 4, "rmk::parse::duplicate_recipe")]
#[case(": b\n", 1, "rmk::parse::syntax")]
#[case("just words\n", 1, "rmk::parse::syntax")]
#[case("X=${Y\n", 1, "rmk::parse::expand")]
fn malformed_files_name_the_line(#[case] text: &str, #[case] line: usize, #[case] code: &str) {
    let err = parse(text).expect_err("malformed");
    assert_eq!(err.location().line, line);
    let rendered = err.code().map(|c| c.to_string());
    assert_eq!(rendered.as_deref(), Some(code));
}

#[test]
fn includes_splice_files_relative_to_the_build_dir() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
    std::fs::write(root.join("rules.mk"), "CC=cc\nlib.a: x.o\n").expect("write include");
    let rules = parse_in(&root, "<rules.mk\nall: $CC\n", VarTable::new()).expect("parse");
    assert!(rules.explicit("lib.a").is_some());
    assert_eq!(rules.explicit("all").map(|t| t.prereqs.clone()), Some(vec!["cc".to_owned()]));
}

#[test]
fn self_inclusion_hits_the_depth_limit() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
    std::fs::write(root.join("loop.mk"), "<loop.mk\n").expect("write include");
    let err = parse_in(&root, "<loop.mk\n", VarTable::new()).expect_err("too deep");
    assert!(matches!(err.kind(), ParseErrorKind::IncludeDepth(MAX_INCLUDE_DEPTH)));
}

#[test]
fn missing_include_is_reported() {
    let err = parse("<nowhere.mk\n").expect_err("missing include");
    assert!(matches!(err.kind(), ParseErrorKind::Read { .. }));
    assert_eq!(err.location().line, 1);
}

#[test]
fn command_includes_parse_command_output() {
    let shell = FragmentShell("gen.h:\n\ttouch gen.h\n");
    let program = ShellProgram::default();
    let session = ShellSession::new(&shell, &program, Utf8Path::new("."));
    let rules = parse_str("mkfile", "<|./genrules\n", VarTable::new(), session).expect("parse");
    assert_eq!(recipe_of(&rules, "gen.h"), Some("touch gen.h"));
}
