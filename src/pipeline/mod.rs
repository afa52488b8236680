//! Seam to the external text-to-image engine.
//!
//! - `InferencePipeline` - the one operation the app needs from the engine
//! - `ModelResources` - locating the model asset directory
//! - `CommandPipeline` - engine driven as an external process
//! - `GenerationWorker` - runs requests off the GTK main thread

pub mod command;
pub mod resources;
pub mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::models::{GenerationRequest, GenerationResult};

pub use command::CommandPipeline;
pub use resources::ModelResources;
pub use worker::GenerationWorker;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("engine program not found: {0:?}")]
    ProgramNotFound(String),
    #[error("failed to launch engine {program:?}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("engine exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },
    #[error("engine i/o error")]
    Io(#[from] std::io::Error),
    #[error("generation cancelled")]
    Cancelled,
    #[error("engine error: {0}")]
    Engine(String),
}

/// A text-to-image engine.
///
/// Implementations are constructed once at startup (model loading is
/// expensive) and shared across every generation cycle.
pub trait InferencePipeline: Send + Sync {
    /// Produce `request.image_count` entries; an entry is `None` when the
    /// engine filtered or failed that image. Long-running implementations
    /// should poll `cancel` and return [`PipelineError::Cancelled`].
    fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<GenerationResult, PipelineError>;
}

/// Shared cancellation flag for one request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
