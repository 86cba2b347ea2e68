use thiserror::Error;

use crate::index::row::TokenKind;

/// All failures the document model can surface.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed input, reported at the byte offset the tokenizer rejected.
    #[error("invalid KDL-ish input at byte {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// Operation on a document whose buffers were already released.
    #[error("document has been disposed")]
    Disposed,

    /// Array access outside `0..len`.
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Accessor called on a token of the wrong kind.
    #[error("expected {expected}, found {actual:?}")]
    WrongKind {
        expected: &'static str,
        actual: TokenKind,
    },

    /// Construction-time rejection of an unsupported mode.
    #[error("not supported: {0}")]
    Unsupported(&'static str),

    /// Inputs longer than `i32::MAX` bytes cannot be indexed.
    #[error("document of {len} bytes exceeds the supported maximum")]
    DocumentTooLarge { len: usize },

    /// Index growth past its storage cap, or a container spanning more rows
    /// than a row can record.
    #[error("metadata index exceeds the supported maximum size")]
    IndexTooLarge,

    /// The input buffer is not valid UTF-8.
    #[error("input is not valid UTF-8 at byte {offset}")]
    InvalidUtf8 { offset: usize },

    /// Failure propagated from a writer sink.
    #[error("write failed: {0}")]
    Write(String),
}

impl Error {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn wrong_kind(expected: &'static str, actual: TokenKind) -> Self {
        Error::WrongKind { expected, actual }
    }

    pub(crate) fn index_out_of_range(index: usize, len: usize) -> Self {
        Error::IndexOutOfRange { index, len }
    }

    pub(crate) fn unsupported(context: &'static str) -> Self {
        Error::Unsupported(context)
    }

    /// For writer implementations that need to surface their own failures.
    pub fn write(message: impl Into<String>) -> Self {
        Error::Write(message.into())
    }
}
