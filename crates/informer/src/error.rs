//! Informer errors

use thiserror::Error;

/// Errors that can stop an informer.
#[derive(Debug, Error)]
pub enum InformerError {
    /// The watch source stream finished; the informer cannot continue
    #[error("Watch stream ended unexpectedly")]
    StreamEnded,
}
