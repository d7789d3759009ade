//! Error types for the grass simulation

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration, detected before any dispatch is issued
    #[error("Configuration error: {0}")]
    Config(String),

    /// Per-blade or per-collider collection does not match the allocated size
    #[error("Buffer size mismatch for {name}: expected {expected}, got {actual}")]
    BufferSize {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Readback error: {0}")]
    Readback(String),
}
