use crate::DType;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by every tensorio codec.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TensorIoError {
    /// The file could not be opened, created, or mapped.
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Malformed header, unknown tag, nested arrays, out-of-bounds payload.
    #[error("malformed data: {0}")]
    Format(String),
    /// A dtype has no mapping in the target format.
    #[error("`{name}`: dtype {dtype} is not supported")]
    UnsupportedType { name: String, dtype: DType },
    /// A tensor could not be presented as a non-empty, contiguous buffer of the expected rank.
    #[error("`{name}`: {reason}")]
    Contiguity { name: String, reason: String },
    /// Quantized tensor whose last dimension is not a multiple of the block size.
    #[error("tensor `{name}` has incompatible last dim {dim} (must be a multiple of {block})")]
    Shape { name: String, dim: usize, block: usize },
    /// Stream-level I/O failure (reader/writer based entry points).
    #[error(transparent)]
    Stream(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TensorIoError>;

impl TensorIoError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn unsupported(name: impl Into<String>, dtype: DType) -> Self {
        Self::UnsupportedType { name: name.into(), dtype }
    }

    pub fn contiguity(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Contiguity { name: name.into(), reason: reason.into() }
    }
}
