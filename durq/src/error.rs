//! Error types for the durq persistent queue.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all durq operations.
///
/// Each variant wraps the error enum of one concern: the storage medium,
/// the persisted control block, queue operations, and configuration.
#[derive(Error, Debug)]
pub enum DurqError {
    /// Error talking to the backing medium.
    #[error("medium error: {0}")]
    Medium(#[from] MediumError),

    /// Error encoding, decoding, or persisting the control block.
    #[error("header error: {0}")]
    Header(#[from] HeaderError),

    /// Error during an enqueue, dequeue, or peek.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Error validating or loading a queue configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by the storage medium and the volume that holds it.
#[derive(Error, Debug)]
pub enum MediumError {
    /// The volume could not be mounted, or a store could not be opened,
    /// created, or removed.
    #[error("store '{name}' unavailable: {source}")]
    Unavailable {
        /// Name of the store within its volume.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A read or write moved fewer bytes than requested.
    #[error("partial I/O at offset {offset}: transferred {transferred} of {requested} bytes")]
    PartialIo {
        /// Physical offset where the transfer started.
        offset: u64,
        /// Number of bytes requested.
        requested: usize,
        /// Number of bytes actually transferred.
        transferred: usize,
    },

    /// A read or write failed outright.
    #[error("I/O failed at offset {offset}: {source}")]
    Io {
        /// Physical offset of the failed transfer.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Flushing the medium to durable storage failed.
    #[error("failed to sync store '{name}': {source}")]
    SyncFailed {
        /// Name of the store within its volume.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors concerning the persisted control block.
#[derive(Error, Debug)]
pub enum HeaderError {
    /// The control block could not be read in full.
    #[error("control block is short: read {read} of {expected} bytes")]
    Short {
        /// Bytes the layout requires.
        expected: usize,
        /// Bytes actually read.
        read: usize,
    },

    /// Writing the control block moved fewer bytes than its layout declares.
    #[error("control block write incomplete: wrote {written} of {expected} bytes")]
    WriteIncomplete {
        /// Bytes the layout requires.
        expected: usize,
        /// Bytes actually written.
        written: usize,
    },

    /// The control block decoded to values that violate a queue invariant.
    #[error("control block is corrupt: {reason}")]
    Corrupt {
        /// Which invariant was violated.
        reason: String,
    },
}

/// Errors that can occur during queue operations.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The record length is zero, over the configured limit, or does not
    /// match the fixed element size.
    #[error("invalid record length {length}: {reason}")]
    InvalidLength {
        /// The rejected length.
        length: usize,
        /// Why the length was rejected.
        reason: String,
    },

    /// Not enough free space for the record.
    #[error("queue full: record needs {required} bytes, {available} available")]
    Full {
        /// Bytes the record would occupy in the ring.
        required: u32,
        /// Bytes currently available.
        available: u32,
    },

    /// The record counter is already at its maximum.
    #[error("queue already holds {max} records")]
    CountOverflow {
        /// The counter ceiling.
        max: u16,
    },

    /// A stored length prefix describes a record that cannot exist in the ring.
    #[error("corrupt record at index {index}: length {length} exceeds occupied bytes {occupied}")]
    CorruptRecord {
        /// Logical index of the record.
        index: u32,
        /// Decoded payload length.
        length: u16,
        /// Bytes the queue says are occupied.
        occupied: u32,
    },
}

/// Errors in a queue configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration value is out of range.
    #[error("invalid queue configuration: {reason}")]
    Invalid {
        /// Description of the problem.
        reason: String,
    },

    /// A configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Load {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON for a queue config.
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Type alias for `Result<T, DurqError>`.
pub type Result<T> = std::result::Result<T, DurqError>;
