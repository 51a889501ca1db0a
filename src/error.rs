use std::num::ParseIntError;
use thiserror::Error;

use crate::av::CodecId;

#[derive(Error, Debug)]
pub enum EncMuxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The reorder window is smaller than the encoder's actual lookahead.
    #[error("pts cache overflow: more than {capacity} frames pending")]
    CacheOverflow { capacity: usize },

    /// No pending frame carries the presentation timestamp the encoder returned.
    #[error("pts cache miss: no cached frame for pts {pts}")]
    CacheMiss { pts: i64 },

    #[error("encoder rejected frame: {0}")]
    EncoderRejectedFrame(String),

    #[error("encoder is in an error state")]
    EncoderFailed,

    #[error("encoder not initialized")]
    NotInitialized,

    #[error("stream already closed")]
    StreamClosed,

    /// A page write failed earlier; the output is incomplete and takes no more writes.
    #[error("output failed after a write error")]
    OutputFailed,

    #[error("no stream with index {0}")]
    NoSuchStream(usize),

    #[error("unsupported codec: {0:?}")]
    UnsupportedCodec(CodecId),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

pub type Result<T> = std::result::Result<T, EncMuxError>;
