//! Unit tests for the runner module's helpers.

use super::*;
use rstest::rstest;
use std::path::PathBuf;

fn cli_with(args: &[&str]) -> Cli {
    Cli {
        args: args.iter().map(|arg| (*arg).to_owned()).collect(),
        ..Cli::default()
    }
}

#[rstest]
#[case(&[], Some("all"), Some(vec!["all"]))]
#[case(&["X=1"], Some("all"), Some(vec!["all"]))]
#[case(&["lib", "X=1", "test"], Some("all"), Some(vec!["lib", "test"]))]
#[case(&[], None, None)]
fn roots_fall_back_to_the_default_target(
    #[case] args: &[&str],
    #[case] default_target: Option<&str>,
    #[case] expected: Option<Vec<&str>>,
) {
    let roots = requested_roots(&cli_with(args), default_target);
    let expected_owned = expected.map(|names| names.into_iter().map(str::to_owned).collect());
    assert_eq!(roots, expected_owned);
}

#[test]
fn dry_run_takes_precedence_over_execution() {
    let cli = Cli {
        dry_run: true,
        ..Cli::default()
    };
    assert_eq!(execution_mode(&cli), ExecutionMode::DryRun);
    assert_eq!(execution_mode(&Cli::default()), ExecutionMode::Execute);
}

#[test]
fn rule_file_is_resolved_inside_the_build_directory() {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(dir.path().join("mkfile"), "all:V:\n").expect("write mkfile");
    let cli = Cli {
        directory: Some(dir.path().to_path_buf()),
        ..Cli::default()
    };
    let build_dir = resolve_build_dir(&cli).expect("utf8 dir");
    let rule_file = resolve_rule_file(&cli, &build_dir).expect("rule file");
    assert!(rule_file.ends_with("mkfile"));
    assert!(rule_file.starts_with(&build_dir));
}

#[test]
fn missing_rule_file_is_reported() {
    let cli = Cli {
        file: PathBuf::from("does-not-exist.mk"),
        ..Cli::default()
    };
    let build_dir = resolve_build_dir(&cli).expect("utf8 dir");
    let err = resolve_rule_file(&cli, &build_dir).expect_err("missing");
    assert!(matches!(err, RunnerError::RuleFileNotFound { .. }));
}
