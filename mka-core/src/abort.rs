//! Cooperative cancellation.
//!
//! An [`AbortSignal`] is handed to the I/O layer; the demuxer never polls it
//! itself. The stream wrapper checks it before every read and reports an
//! interruption, which surfaces as [`crate::Error::Aborted`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, cloneable abort flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Create a signal in the "not aborted" state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones observe it.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return an `Interrupted` I/O error if cancellation was requested.
    pub fn check(&self) -> std::io::Result<()> {
        if self.is_aborted() {
            Err(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "operation aborted",
            ))
        } else {
            Ok(())
        }
    }
}
