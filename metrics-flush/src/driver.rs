use std::{future::Future, pin::Pin};

use thiserror::Error;

use crate::Binding;

/// Errors that could occur while sending a batch of bindings.
#[derive(Debug, Error)]
pub enum SendError {
    /// The backend could not be reached, even after retrying.
    #[error("backend unreachable after {attempts} attempt(s): {reason}")]
    Unreachable { attempts: usize, reason: String },

    /// The request to the backend could not be built.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

/// Convenience type for the future returned by [`Driver::send`].
pub type SendFuture = Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + 'static>>;

/// A backend receiving batches of bindings.
///
/// The manager calls `send` from a task of its own and never awaits it from the flush loop, so a
/// slow backend never delays the next tick. The returned future must own everything it needs.
pub trait Driver: Send + Sync + 'static {
    /// Delivers the current state of the given bindings.
    fn send(&self, batch: Vec<Binding>) -> SendFuture;
}
