#![deny(unsafe_code)]

//! Bencoded metadata documents for the Brook workspace.
//!
//! A torrent's full persisted state is one hierarchical [`Value`] tree
//! (maps, lists, byte strings, integers) serialized compactly. The engine
//! treats most of the tree as opaque; the client mutates only its own
//! bookkeeping and resume sections.

mod codec;
mod value;

pub use codec::{decode, encode};
pub use value::{Map, Value};

use thiserror::Error;

/// Errors produced while decoding a bencoded document.
#[derive(Debug, Error)]
pub enum BencodeError {
    /// Input ended before the value was complete.
    #[error("truncated bencode input at byte {offset}")]
    Truncated {
        /// Byte offset where more input was expected.
        offset: usize,
    },
    /// Byte that cannot start or continue a value at this position.
    #[error("unexpected byte {byte:#04x} at offset {offset}")]
    Unexpected {
        /// The offending byte.
        byte: u8,
        /// Byte offset of the offending byte.
        offset: usize,
    },
    /// Malformed integer payload (empty, leading zeros, lone minus).
    #[error("invalid integer at offset {offset}")]
    InvalidInteger {
        /// Byte offset of the integer token.
        offset: usize,
    },
    /// Malformed string length prefix.
    #[error("invalid string length at offset {offset}")]
    InvalidLength {
        /// Byte offset of the length prefix.
        offset: usize,
    },
    /// Dictionary key was not valid UTF-8.
    #[error("dictionary key is not UTF-8 at offset {offset}")]
    NonUtf8Key {
        /// Byte offset of the key.
        offset: usize,
    },
    /// Value nesting exceeded the supported depth.
    #[error("bencode nesting deeper than {limit} levels")]
    TooDeep {
        /// Maximum accepted nesting depth.
        limit: usize,
    },
    /// Bytes remained after a complete top-level value.
    #[error("trailing bytes after bencoded value at offset {offset}")]
    Trailing {
        /// Byte offset of the first trailing byte.
        offset: usize,
    },
}

/// Convenience alias for decode results.
pub type BencodeResult<T> = Result<T, BencodeError>;
