//! The external shell capability.
//!
//! Everything rmk runs (recipes, command substitutions, comparators) goes
//! through the [`Shell`] trait so the engine never depends on a particular
//! process-spawning API. [`ProcessShell`] is the production implementation.

use std::ffi::OsString;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use mk_env::{DEFAULT_SHELL, SHELL_ENV};
use shell_quote::{QuoteRefExt, Sh};

/// How a child's output streams are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Standard output and standard error interleaved into one buffer.
    Combined,
    /// Standard output only; standard error goes to the parent's stderr.
    Stdout,
}

/// Where and how a command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingContext {
    /// Working directory of the child.
    pub dir: Utf8PathBuf,
    /// Variables added to the inherited environment.
    pub env: Vec<(String, String)>,
    /// Stream collection mode.
    pub capture: Capture,
}

/// Exit status and collected output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` when the child was killed by a signal.
    pub code: Option<i32>,
    /// Collected output (see [`Capture`]).
    pub output: Vec<u8>,
}

impl CommandOutput {
    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Runs external commands.
pub trait Shell: Send + Sync {
    /// Run `argv` (program first) in `context`.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] when the command cannot be started or its
    /// output cannot be read. A non-zero exit is not an error.
    fn run(&self, argv: &[String], context: &WorkingContext) -> io::Result<CommandOutput>;
}

/// The shell program and its leading arguments, e.g. `["sh"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellProgram(Vec<String>);

impl ShellProgram {
    /// Build a program from explicit words, falling back to the default
    /// shell when `words` is empty.
    #[must_use]
    pub fn new(words: Vec<String>) -> Self {
        if words.is_empty() {
            Self(vec![DEFAULT_SHELL.to_owned()])
        } else {
            Self(words)
        }
    }

    /// Resolve the shell from [`SHELL_ENV`].
    #[must_use]
    pub fn resolve() -> Self {
        Self::resolve_with(|key| std::env::var_os(key))
    }

    /// Resolve the shell using `read_env` to look up [`SHELL_ENV`].
    ///
    /// Values that are not UTF-8 or do not split into shell words are
    /// ignored.
    pub fn resolve_with<F>(mut read_env: F) -> Self
    where
        F: FnMut(&str) -> Option<OsString>,
    {
        let words = read_env(SHELL_ENV)
            .and_then(|value| value.into_string().ok())
            .and_then(|value| shlex::split(&value))
            .unwrap_or_default();
        Self::new(words)
    }

    /// Program words.
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.0
    }

    fn argv(&self, script: &str, errexit: bool) -> Vec<String> {
        let mut argv = self.0.clone();
        if errexit {
            argv.push("-e".to_owned());
        }
        argv.push("-c".to_owned());
        argv.push(script.to_owned());
        argv
    }
}

impl Default for ShellProgram {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// A shell bound to a program and a working directory.
#[derive(Clone, Copy)]
pub struct ShellSession<'a> {
    shell: &'a dyn Shell,
    program: &'a ShellProgram,
    dir: &'a Utf8Path,
}

impl std::fmt::Debug for ShellSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("program", self.program)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl<'a> ShellSession<'a> {
    /// Bind `shell` to `program`, running commands inside `dir`.
    #[must_use]
    pub const fn new(shell: &'a dyn Shell, program: &'a ShellProgram, dir: &'a Utf8Path) -> Self {
        Self {
            shell,
            program,
            dir,
        }
    }

    /// Directory commands run in.
    #[must_use]
    pub const fn dir(&self) -> &'a Utf8Path {
        self.dir
    }

    /// Run `script` with `program -c script`, adding `-e` when `errexit` is
    /// set.
    ///
    /// # Errors
    ///
    /// Propagates the [`Shell`] implementation's error.
    pub fn run_script(
        &self,
        script: &str,
        env: Vec<(String, String)>,
        capture: Capture,
        errexit: bool,
    ) -> io::Result<CommandOutput> {
        let context = WorkingContext {
            dir: self.dir.to_path_buf(),
            env,
            capture,
        };
        self.shell.run(&self.program.argv(script, errexit), &context)
    }
}

/// Quote `word` for inclusion in a POSIX shell command line.
#[must_use]
pub fn quote_word(word: &str) -> String {
    let bytes: Vec<u8> = word.quoted(Sh);
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(&err.into_bytes()).into_owned(),
    }
}

/// [`Shell`] backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessShell;

impl Shell for ProcessShell {
    fn run(&self, argv: &[String], context: &WorkingContext) -> io::Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(context.dir.as_std_path())
            .envs(context.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());
        tracing::info!("Running command: {}", argv.iter().join(" "));

        let (mut reader, writer) = io::pipe()?;
        match context.capture {
            Capture::Combined => {
                cmd.stdout(writer.try_clone()?);
                cmd.stderr(writer);
            }
            Capture::Stdout => {
                cmd.stdout(writer);
                cmd.stderr(Stdio::inherit());
            }
        }
        let mut child = cmd.spawn()?;
        // The command still owns the write ends; release them so the read
        // below sees end-of-file once the child exits.
        drop(cmd);

        let mut output = Vec::new();
        if let Err(err) = reader.read_to_end(&mut output) {
            terminate_child(&mut child, "output read failed");
            return Err(err);
        }
        let status = child.wait()?;
        Ok(CommandOutput {
            code: status.code(),
            output,
        })
    }
}

fn terminate_child(child: &mut Child, context: &str) {
    if let Err(err) = child.kill() {
        tracing::debug!("failed to kill child after {context}: {err}");
    }
    if let Err(err) = child.wait() {
        tracing::debug!("failed to reap child after {context}: {err}");
    }
}
