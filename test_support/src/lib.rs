//! Test utilities for rmk.
//!
//! Provides temporary rule-file projects, shells and reporters that record
//! what the build engine asked of them, and guards for tests that mutate the
//! process environment.

pub mod env;
pub mod project;
pub mod recording;

pub use env::{EnvLock, EnvVarGuard};
pub use project::Project;
pub use recording::{Invocation, RecordingReporter, RecordingShell, Reported};
