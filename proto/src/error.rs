#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    InvalidOffset(String),
    InvalidTxid(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InvalidOffset(s) => write!(f, "Invalid offset: {}", s),
            DecodeError::InvalidTxid(s) => write!(f, "Invalid txid: {}", s),
        }
    }
}

impl std::error::Error for DecodeError {}
