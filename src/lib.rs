//! rmk core library.
//!
//! rmk reads an `mkfile` of variable assignments, explicit rules and
//! pattern rules, resolves the requested targets into a dependency graph,
//! decides which targets are out of date and runs their recipes through
//! `sh` on a pool of worker threads.
//!
//! The pipeline is split across modules in the order data flows through
//! it: [`parser`] (using [`expand`] and [`pattern`]) produces an
//! [`ast::RuleSet`], [`graph`] resolves it into a [`graph::BuildGraph`],
//! [`staleness`] marks what must be rebuilt, and [`scheduler`] drives
//! [`executor`] jobs. [`runner`] wires the pipeline to the [`cli`].

pub mod artifact;
pub mod ast;
pub mod cli;
pub mod executor;
pub mod expand;
pub mod graph;
pub mod parser;
pub mod pattern;
pub mod runner;
pub mod scheduler;
pub mod staleness;
pub mod status;
