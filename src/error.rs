//! Error handling for feedswitch
//!
//! This module defines the crate-level error type and a Result alias used by
//! configuration loading and the binary. Pipeline internals use the more
//! specific [`PipelineError`](crate::pipeline::PipelineError).

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for feedswitch operations
#[derive(Error, Debug)]
pub enum FeedSwitchError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Graph construction or capability failure
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FeedSwitchError>,
    },
}

impl FeedSwitchError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FeedSwitchError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all context stripped
    pub fn root(&self) -> &FeedSwitchError {
        match self {
            FeedSwitchError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for feedswitch operations
pub type Result<T> = std::result::Result<T, FeedSwitchError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FeedSwitchError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| FeedSwitchError::from(e).with_context(f()))
    }
}
