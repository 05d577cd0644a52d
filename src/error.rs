//! Error types for loader setup, configuration and context switching.

use std::path::PathBuf;

use thiserror::Error;

/// Setting up the loader failed. The view must not start; there is no retry.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create loader window: {0}")]
    Window(String),

    #[error("failed to create loader GL context: {0}")]
    Context(String),

    #[error("failed to share GL objects with the render context: {0}")]
    ShareContext(String),

    #[error("loader GL context cannot be made current: {0}")]
    MakeCurrent(#[from] ContextError),

    #[error("failed to spawn loader thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("make current failed: {0}")]
    MakeCurrent(String),

    #[error("release failed: {0}")]
    Release(String),
}
