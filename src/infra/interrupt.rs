//! Ctrl-C as a polled flag
//!
//! The first SIGINT only sets the flag; whoever is blocked (model stream,
//! input prompt) notices it and reports a cancellation. A second SIGINT
//! arriving while the flag is still set exits the process with status 130.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use signal_hook::consts::SIGINT;
use signal_hook::flag;

#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Flag with no signal handler attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach SIGINT handlers to a fresh flag
    pub fn install() -> Result<Self> {
        let flag_ref = Arc::new(AtomicBool::new(false));
        // Registered first so it sees the flag before the setter below runs
        flag::register_conditional_shutdown(SIGINT, 130, Arc::clone(&flag_ref))
            .context("Failed to register SIGINT shutdown handler")?;
        flag::register(SIGINT, Arc::clone(&flag_ref))
            .context("Failed to register SIGINT flag handler")?;
        Ok(Self(flag_ref))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume a pending interrupt
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Raise the flag without a signal
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
