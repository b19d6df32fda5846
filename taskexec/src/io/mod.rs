//! Side-effecting building blocks: persistence, subprocesses, providers.

pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod conversation;
pub mod edits;
pub mod files;
pub mod history;
pub mod json;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod provider;
pub mod test_detect;
