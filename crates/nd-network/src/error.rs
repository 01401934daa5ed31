use thiserror::Error;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Node index out of bounds: {index} (len={len})")]
    NodeOob { index: usize, len: usize },
}
