use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, TesseraError};

/// Shared flag polled at well-defined checkpoints. Clones observe the same
/// flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted(what))` once cancelled.
    pub fn check(&self, what: &'static str) -> Result<()> {
        if self.is_cancelled() {
            Err(TesseraError::Interrupted(what))
        } else {
            Ok(())
        }
    }
}
