use thiserror::Error;

pub type FprintResult<T> = Result<T, FprintError>;

#[derive(Debug, Error)]
pub enum FprintError {
    #[error("config error: {0}")]
    Config(String),

    #[error("hash error: {0}")]
    Hash(String),

    #[error("sniff error: {0}")]
    Sniff(String),
}
