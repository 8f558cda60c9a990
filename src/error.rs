//! Crate-wide error taxonomy.
//!
//! Mirrors the domain/sub-code structure of the C reference library's
//! error set: every fallible operation in this crate returns one of the
//! variants below rather than a bare [`std::io::Error`] or `String`.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("argument error: {0}")]
    Argument(#[from] ArgumentError),
    #[error("i/o error: {0}")]
    Io(#[from] IoError),
    #[error("input error: {0}")]
    Input(#[from] InputError),
    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

#[derive(Debug, thiserror::Error)]
pub enum ArgumentError {
    #[error("invalid value: {message}")]
    InvalidValue { message: String },
    #[error("value less than zero: {message}")]
    ValueLessThanZero { message: String },
    #[error("value zero or less: {message}")]
    ValueZeroOrLess { message: String },
    #[error("value exceeds maximum ({value} > {maximum}): {message}")]
    ValueExceedsMaximum {
        message: String,
        value: u64,
        maximum: u64,
    },
    #[error("value too small: {message}")]
    ValueTooSmall { message: String },
    #[error("value too large: {message}")]
    ValueTooLarge { message: String },
    #[error("value out of bounds: {message}")]
    ValueOutOfBounds { message: String },
    #[error("unsupported value: {message}")]
    UnsupportedValue { message: String },
    #[error("conflicting value: {message}")]
    ConflictingValue { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("open failed: {message}")]
    Open { message: String },
    #[error("close failed: {message}")]
    Close { message: String },
    #[error("seek failed: {message}")]
    Seek { message: String },
    #[error("read failed: {message}")]
    Read { message: String },
    #[error("write failed: {message}")]
    Write { message: String },
    #[error("access denied: {message}")]
    AccessDenied { message: String },
    #[error("invalid resource: {message}")]
    InvalidResource { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("invalid data: {message}")]
    InvalidData { message: String },
    #[error("signature mismatch: {message}")]
    SignatureMismatch { message: String },
    #[error("checksum mismatch: {message}")]
    ChecksumMismatch { message: String },
    #[error("value mismatch: {message}")]
    ValueMismatch { message: String },
    #[error("unsupported value: {message}")]
    UnsupportedValue { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("compress failed: {message}")]
    CompressFailed { message: String },
    #[error("decompress failed: {message}")]
    DecompressFailed { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("insufficient memory: {message}")]
    Insufficient { message: String },
    #[error("copy failed: {message}")]
    CopyFailed { message: String },
    #[error("set failed: {message}")]
    SetFailed { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("value missing: {message}")]
    ValueMissing { message: String },
    #[error("initialize failed: {message}")]
    InitializeFailed { message: String },
    #[error("get failed: {message}")]
    GetFailed { message: String },
    #[error("set failed: {message}")]
    SetFailed { message: String },
    #[error("abort requested")]
    AbortRequested,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        let message = err.to_string();
        let io_err = match err.kind() {
            NotFound => IoError::Open { message },
            PermissionDenied => IoError::AccessDenied { message },
            UnexpectedEof => IoError::Read { message },
            _ => IoError::Read { message },
        };
        Error::Io(io_err)
    }
}

impl Error {
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Error::Input(InputError::InvalidData {
            message: message.into(),
        })
    }

    pub fn decompress_failed(message: impl Into<String>) -> Self {
        Error::Compression(CompressionError::DecompressFailed {
            message: message.into(),
        })
    }

    pub fn value_exceeds_maximum(message: impl Into<String>, value: u64, maximum: u64) -> Self {
        Error::Argument(ArgumentError::ValueExceedsMaximum {
            message: message.into(),
            value,
            maximum,
        })
    }
}
