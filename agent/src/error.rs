//! Error types for the Autolearn agent.
//!
//! Page-side failures are almost never fatal. Transport errors and page
//! errors are logged where they happen and the agent carries on with its
//! next tick; [`AgentError`] exists for the few call sites that do bubble
//! failures up (configuration loading and the CLI).

use thiserror::Error;

use autolearn_coordinator::{StoreError, TransportError};

use crate::config::ConfigError;
use crate::dom::ElementId;

/// Errors that can occur during agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistent store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Coordinator message failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Page interaction failure.
    #[error("page error: {0}")]
    Page(#[from] PageError),
}

/// Errors raised by a [`Page`](crate::page::Page) capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// The tab behind this page no longer exists.
    #[error("page is detached")]
    Detached,

    /// The element is no longer part of the document.
    #[error("element {0} is not in the document")]
    ElementMissing(ElementId),

    /// The media element refused to start playing.
    #[error("playback rejected: {0}")]
    PlaybackRejected(String),

    /// The page has no media element.
    #[error("page has no media element")]
    NoMedia,
}

/// A specialized `Result` type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_error_display() {
        assert_eq!(PageError::Detached.to_string(), "page is detached");
        assert_eq!(
            PageError::ElementMissing(ElementId(4)).to_string(),
            "element #4 is not in the document"
        );
        assert_eq!(
            PageError::PlaybackRejected("autoplay blocked".to_string()).to_string(),
            "playback rejected: autoplay blocked"
        );
    }

    #[test]
    fn agent_error_from_conversions() {
        let err: AgentError = TransportError::RecipientGone.into();
        assert!(matches!(err, AgentError::Transport(_)));

        let err: AgentError = PageError::NoMedia.into();
        assert_eq!(err.to_string(), "page error: page has no media element");

        let err: AgentError = ConfigError::NoHomeDirectory.into();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
