use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("max level must be positive, got {0}")]
    InvalidMaxLevel(usize),

    #[error("invalid line: {0:?}")]
    InvalidLine(String),

    #[error("failed to parse {what} from {input:?}")]
    Parse { what: &'static str, input: String },

    #[error("block checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    Checksum { expected: u32, actual: u32 },

    #[error("corrupt block: {0}")]
    Corrupt(&'static str),

    #[error("snappy error: {0}")]
    Compression(#[from] snap::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
