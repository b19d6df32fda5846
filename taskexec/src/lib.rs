//! Local, filesystem-persisted task executor for a coding assistant.
//!
//! For each task the [`orchestrator`] decides between returning a cached
//! answer, running the iterative [`edit_loop`] (edit, test, checkpoint), or
//! asking the completion provider once. All durable state lives under
//! `{root}/.taskexec/` so an interrupted run can be inspected and resumed.
//!
//! - **[`core`]**: Pure, deterministic logic (fingerprints, edit parsing,
//!   truncation, task classification, the data model).
//! - **[`io`]**: Side-effecting operations (stores, cache, subprocesses,
//!   providers, prompts). Collaborators sit behind traits so tests can script
//!   them.

pub mod cancel;
pub mod core;
pub mod edit_loop;
pub mod errors;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
