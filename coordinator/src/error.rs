//! Error types for talking to the Autolearn coordinator.
//!
//! Store failures are reported as [`StoreError`](crate::store::StoreError);
//! everything that crosses an execution-context boundary fails with a
//! [`TransportError`].
//!
//! Transport failures are expected in normal operation: tabs close, reload,
//! or stop answering at any time. Callers log them and carry on as if no
//! response were needed.

use thiserror::Error;

/// Errors that occur when sending a message between execution contexts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The receiving context no longer exists (tab closed, coordinator stopped).
    #[error("recipient is gone")]
    RecipientGone,

    /// The recipient received the message but could not carry it out.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The recipient replied with a response of the wrong shape.
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}
