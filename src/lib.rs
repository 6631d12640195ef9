//! Dozer - dependency graphs and equivalence scoring from syscall traces
//!
//! This library turns the text output of a syscall tracer into a canonical
//! graph of the files, shared libraries and network endpoints an execution
//! depended on, maps those resources to declarative package names, and scores
//! whether two executions depend on the same underlying resources.
//!
//! Pipeline: [`parse`] → [`process_state`] → [`graph`] → [`resolver`] /
//! [`equivalence`]. [`pipeline`] wires the stages together.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod equivalence;
pub mod error;
pub mod filter;
pub mod graph;
pub mod json_output;
pub mod parse;
pub mod pipeline;
pub mod process_state;
pub mod resolver;
pub mod similarity;
pub mod syscalls;
