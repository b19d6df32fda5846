//! Cooperative cancellation.
//!
//! Long-running work checks a shared [`CancelToken`] at suspension points
//! (before each provider call and before each test run). The binary wires the
//! token to SIGINT.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

use crate::errors::Interrupted;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once cancellation was requested.
    pub fn check(&self, during: &str) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            return Err(Interrupted {
                during: during.to_string(),
            });
        }
        Ok(())
    }

    /// Set this token when the process receives SIGINT.
    pub fn register_sigint(&self) -> Result<()> {
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&self.flag))
            .context("register SIGINT handler")?;
        Ok(())
    }
}
