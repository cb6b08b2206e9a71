use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PressError {
    #[error("No usable video or audio stream in: {0}")]
    NoStream(PathBuf),

    #[error("Configuration failed: {0}")]
    Configuration(String),

    #[error("FFprobe failed: {0}")]
    Probe(String),

    #[error("Engine execution failed: {0}")]
    Execution(String),

    #[error("Conversion cancelled by user")]
    Cancelled,

    #[error("Cannot determine output file name for: {0}")]
    Path(PathBuf),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PressError {
    /// Configuration-class failures abandon the file without touching the
    /// engine; execution-class failures happened while the engine ran.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PressError::NoStream(_)
                | PressError::Configuration(_)
                | PressError::Probe(_)
                | PressError::Path(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PressError>;
