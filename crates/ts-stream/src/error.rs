//! Error types for treestream.

use thiserror::Error;

/// Errors raised while parsing schemas or driving record streams.
#[derive(Error, Debug)]
pub enum StreamError {
    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (config or listing export) error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or inconsistent schema row.
    #[error("schema error (line {line}): {message}")]
    Schema {
        /// 1-based line in the schema text (0 when not tied to a line).
        line: usize,
        /// What is wrong with it.
        message: String,
    },

    /// A field, column, or object group that is not declared.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Read requested on a stream that is not open for reading.
    #[error("stream is not open for reading")]
    NotReadable,

    /// Commit requested on a stream that is not open for writing.
    #[error("stream is not open for writing")]
    NotWritable,

    /// Operation after `close()`.
    #[error("stream is closed")]
    ClosedStream,

    /// Type name that cannot be mapped to a supported element type.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// Value or buffer of the wrong element type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// `select_index` without a preceding `select` for the group.
    #[error("selection for '{0}' was not declared; call select(\"{0}\") first")]
    SelectionNotDeclared(String),

    /// Object index beyond the group length of the current entry.
    #[error("index {index} out of range for '{name}' (length {len})")]
    IndexOutOfRange {
        /// Group or field name.
        name: String,
        /// Requested index.
        index: usize,
        /// Logical length.
        len: usize,
    },

    /// Entry index beyond the end of the stream.
    #[error("entry {entry} out of range ({entries} entries)")]
    EntryOutOfRange {
        /// Requested entry.
        entry: u64,
        /// Number of entries available.
        entries: u64,
    },

    /// Arrays sharing one counter have different lengths at commit.
    #[error("counter '{counter}': array lengths disagree ({expected} vs {found})")]
    CounterMismatch {
        /// Counter field name.
        counter: String,
        /// Length already assigned.
        expected: usize,
        /// Conflicting length.
        found: usize,
    },

    /// Attempted to read past the end of a buffer.
    #[error("buffer underflow at offset {offset}: need {need} bytes, have {have}")]
    BufferUnderflow {
        /// Read position.
        offset: usize,
        /// Bytes needed.
        need: usize,
        /// Bytes remaining.
        have: usize,
    },

    /// File does not start with the treestream magic.
    #[error("bad magic: not a treestream file")]
    BadMagic,

    /// Block decompression failed.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Structurally invalid stored data.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl StreamError {
    /// Shorthand for a schema error tied to a line.
    pub fn schema(line: usize, message: impl Into<String>) -> Self {
        StreamError::Schema { line, message: message.into() }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, StreamError>;
