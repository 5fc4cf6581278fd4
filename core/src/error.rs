use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop an operation. Everything recoverable is reported through
/// [`crate::Diagnostics`] instead.
#[derive(Debug, Error)]
pub enum GomError {
    #[error("rubric file not found: {}", .0.display())]
    RubricNotFound(PathBuf),

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("no student directories to update")]
    NoTargets,

    #[error("start directory `{0}` is not among the student directories")]
    StartNotFound(String),

    #[error("end directory `{0}` is not among the student directories")]
    EndNotFound(String),

    #[error("end directory `{end}` comes before start directory `{start}`")]
    EndBeforeStart { start: String, end: String },
}

impl GomError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GomError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GomError>;
