use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is no longer alive")]
    NotAlive,

    #[error("task execution failed: {0}")]
    Execution(String),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DispatchError {
    /// Invoker から失敗を返すときのショートカット
    pub fn execution(msg: impl Into<String>) -> Self {
        DispatchError::Execution(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        DispatchError::Config(msg.into())
    }
}
