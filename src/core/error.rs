//! Error types for the solidtree engine

use thiserror::Error;

use crate::math::Aabb;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    /// The shape produced an invalid (NaN) result while classifying a box.
    /// The construction that hit it is aborted and nothing is cached.
    #[error("evaluation failed over {bounds}: {detail}")]
    Evaluation { bounds: Aabb, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid node path: {0}")]
    InvalidPath(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// A task thread panicked or could not be spawned
    #[error("Task error: {0}")]
    Task(String),
}

impl Error {
    /// Convenience constructor for evaluation failures
    pub fn evaluation(bounds: Aabb, detail: impl Into<String>) -> Self {
        Error::Evaluation {
            bounds,
            detail: detail.into(),
        }
    }

    /// Region of the model this error refers to, if any
    pub fn region(&self) -> Option<Aabb> {
        match self {
            Error::Evaluation { bounds, .. } => Some(*bounds),
            _ => None,
        }
    }
}
