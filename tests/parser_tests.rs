//! Rule-file parsing with real files and a real shell.

use anyhow::{Context, Result, ensure};
use rmk::ast::Recipe;
use rmk::executor::{ProcessShell, ShellProgram, ShellSession};
use rmk::expand::VarTable;
use rmk::parser::{ParseErrorKind, parse_file};
use test_support::Project;

fn parse(project: &Project) -> Result<rmk::ast::RuleSet> {
    let program = ShellProgram::default();
    let session = ShellSession::new(&ProcessShell, &program, project.root());
    parse_file(&project.path("mkfile"), VarTable::new(), session).context("parse mkfile")
}

#[test]
fn backquotes_substitute_command_output() -> Result<()> {
    let project = Project::with_mkfile("SRC=`{echo a.c b.c}\nlib.a: $SRC\n\tar r $target $prereq\n")?;
    let rules = parse(&project)?;
    let lib = rules.explicit("lib.a").context("lib.a")?;
    ensure!(lib.prereqs == ["a.c", "b.c"]);
    ensure!(rules.variables().get("SRC") == Some(&["a.c".to_owned(), "b.c".to_owned()][..]));
    Ok(())
}

#[test]
fn command_includes_read_generated_rules() -> Result<()> {
    let project = Project::with_mkfile("<|printf 'gen:V:\\n\\techo gen\\n'\n")?;
    let rules = parse(&project)?;
    let recipe = rules
        .explicit("gen")
        .and_then(|target| target.recipe.as_ref())
        .map(Recipe::as_str);
    ensure!(recipe == Some("echo gen"), "recipe {recipe:?}");
    Ok(())
}

#[test]
fn nested_includes_resolve_from_the_build_directory() -> Result<()> {
    let project = Project::with_mkfile("<rules/top.mk\nall:V: $TARGETS\n")?;
    project.write("rules/top.mk", "<rules/vars.mk\nTARGETS=$TARGETS extra\n")?;
    project.write("rules/vars.mk", "TARGETS=one\n")?;
    let rules = parse(&project)?;
    let all = rules.explicit("all").context("all")?;
    ensure!(all.prereqs == ["one", "extra"]);
    Ok(())
}

#[test]
fn errors_inside_includes_name_the_included_file() -> Result<()> {
    let project = Project::with_mkfile("<broken.mk\n")?;
    project.write("broken.mk", "ok:\n\ttrue\n\n\torphan\n")?;
    let program = ShellProgram::default();
    let session = ShellSession::new(&ProcessShell, &program, project.root());
    let Err(err) = parse_file(&project.path("mkfile"), VarTable::new(), session) else {
        anyhow::bail!("expected a parse error");
    };
    ensure!(matches!(err.kind(), ParseErrorKind::RecipeWithoutRule));
    ensure!(err.location().file.as_str().ends_with("broken.mk"));
    ensure!(err.location().line == 4);
    Ok(())
}
