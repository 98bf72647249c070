use thiserror::Error;

pub type UnspkResult<T> = Result<T, UnspkError>;

#[derive(Debug, Error)]
pub enum UnspkError {
    #[error("config error: {0}")]
    Config(String),

    #[error("key source error: {0}")]
    Keys(String),

    #[error("output error: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
