//! Integration tests for the `rmk` binary using `assert_cmd`.

use anyhow::{Result, ensure};
use predicates::prelude::*;
use rstest::rstest;
use test_support::Project;

fn rmk(project: &Project) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("rmk");
    cmd.current_dir(project.root())
        .env_remove(mk_env::SHELL_ENV)
        .env_remove(mk_env::JOBS_ENV);
    cmd
}

#[test]
fn builds_the_default_target() -> Result<()> {
    let project = Project::with_mkfile("out: in\n\tcp in out\n")?;
    project.write("in", "payload\n")?;
    rmk(&project)
        .assert()
        .success()
        .stdout(predicate::str::contains("cp in out"));
    ensure!(project.read("out")? == "payload\n");
    Ok(())
}

#[test]
fn dry_run_prints_recipes_and_builds_nothing() -> Result<()> {
    let project = Project::with_mkfile("out: in\n\tcp in out\n")?;
    project.write("in", "payload\n")?;
    rmk(&project)
        .arg("-n")
        .assert()
        .success()
        .stdout(predicate::str::contains("cp in out"));
    ensure!(!project.exists("out"));
    Ok(())
}

#[test]
fn quiet_recipes_are_not_echoed() -> Result<()> {
    let project = Project::with_mkfile("hello:VQ:\n\techo greetings\n")?;
    rmk(&project)
        .assert()
        .success()
        .stdout(predicate::eq("greetings\n"));
    Ok(())
}

#[test]
fn assignments_on_the_command_line_override_the_file() -> Result<()> {
    let project = Project::with_mkfile("WHO=file\nhello:VQ:\n\techo hello $WHO\n")?;
    rmk(&project)
        .args(["WHO=cli", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello cli"));
    Ok(())
}

#[test]
fn failing_recipes_exit_with_status_one() -> Result<()> {
    let project = Project::with_mkfile("broken:V:\n\texit 7\n")?;
    rmk(&project)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("recipe for 'broken' failed: exit status 7"));
    Ok(())
}

#[test]
fn tolerated_failures_exit_successfully() -> Result<()> {
    let project = Project::with_mkfile("lint:VE:\n\texit 2\n")?;
    rmk(&project).assert().success();
    Ok(())
}

#[test]
fn directory_flag_changes_where_the_build_runs() -> Result<()> {
    let project = Project::new()?;
    project.write("sub/mkfile", "made:\n\ttouch made\n")?;
    rmk(&project).args(["-C", "sub"]).assert().success();
    ensure!(project.exists("sub/made"));
    Ok(())
}

#[test]
fn alternate_rule_files_are_read_with_f() -> Result<()> {
    let project = Project::new()?;
    project.write("other.mk", "alt:VQ:\n\techo alternate\n")?;
    rmk(&project)
        .args(["-f", "other.mk"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alternate"));
    Ok(())
}

#[rstest]
#[case(&["-j", "0"])]
#[case(&["-n", "-t"])]
#[case(&["--no-such-flag"])]
fn invalid_usage_is_rejected(#[case] args: &[&str]) -> Result<()> {
    let project = Project::with_mkfile("all:V:\n")?;
    rmk(&project).args(args).assert().code(2);
    Ok(())
}

#[test]
fn parse_errors_name_the_line() -> Result<()> {
    let project = Project::with_mkfile("all:\n\techo ok\n\nall:\n\techo again\n")?;
    rmk(&project)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("rmk::parse::duplicate_recipe"));
    Ok(())
}

#[test]
fn cycles_are_reported() -> Result<()> {
    let project = Project::with_mkfile("a: b\n\ttouch a\n\nb: a\n\ttouch b\n")?;
    rmk(&project)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("dependency cycle: a -> b -> a"));
    Ok(())
}
