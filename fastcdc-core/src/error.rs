use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("git {op} failed: {detail}")]
    Git { op: String, detail: String },
}

pub type Result<T> = std::result::Result<T, FilterError>;
