#![forbid(unsafe_code)]

//! Environment variable names shared across rmk crates (library, tests, and
//! helpers).

/// Environment variable naming the shell used to run recipes and command
/// substitutions.
///
/// The value is split into words, so `MKSHELL="bash --norc"` is accepted.
///
/// # Examples
///
/// ```
/// use mk_env::SHELL_ENV;
/// assert_eq!(SHELL_ENV, "MKSHELL");
/// ```
pub const SHELL_ENV: &str = "MKSHELL";

/// Environment variable holding the default number of concurrent recipes.
///
/// # Examples
///
/// ```
/// use mk_env::JOBS_ENV;
/// assert_eq!(JOBS_ENV, "NPROC");
/// ```
pub const JOBS_ENV: &str = "NPROC";

/// Shell used when [`SHELL_ENV`] is unset or empty.
pub const DEFAULT_SHELL: &str = "sh";

/// Rule file read when no `-f` option is given.
pub const DEFAULT_RULE_FILE: &str = "mkfile";
