//! DBGp wire framing.
//!
//! Debugger engines send every message as
//!
//! ```text
//! <ascii decimal length> NUL <payload bytes> NUL
//! ```
//!
//! The IDE direction is plain NUL-terminated command lines and is not length
//! framed, so only the debugger side goes through [`FrameReader`].

mod codec;
mod reader;

use std::io;

use thiserror::Error;

pub use codec::{decode_frame, encode_frame, frame_len, render_message};
pub use reader::FrameReader;

pub const NUL: u8 = 0;

/// Size of a single socket read.
pub const READ_BUFFER_SIZE: usize = 0xffff;

/// Upper bound for one framed message, including prefix and delimiters.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Longest accepted length prefix (digits of `usize::MAX` on 64-bit targets).
pub const MAX_LENGTH_DIGITS: usize = 20;

#[derive(Debug, Error)]
pub enum DbgpError {
    #[error("malformed DBGp length prefix {prefix:?}")]
    MalformedLength { prefix: String },
    #[error("DBGp frame of {len} bytes is not terminated by NUL")]
    MissingTerminator { len: usize },
    #[error("DBGp frame of {len} bytes exceeds maximum allowed size {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("incomplete DBGp frame: expected {expected} bytes, have {have}")]
    Incomplete { expected: usize, have: usize },
    #[error("EOF inside a DBGp frame ({buffered} bytes buffered)")]
    UnexpectedEof { buffered: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DbgpError>;
