//! Persisted control block of a queue file.
//!
//! The control block sits at offset 0 of the backing store and makes the
//! queue self-describing after a restart. All integers are little-endian.
//!
//! # File Format
//!
//! ```text
//! [0..4)    front_idx   u32
//! [4..8)    back_idx    u32
//! [8..10)   count       u16
//! [10..14)  max_size    u32
//! [14]      flags       u8   bit0: fixed element size, bits4-7: medium kind
//! [15..17)  elem_size   u16  only when flags bit0 is set
//! [D..D+max_size)       data region, D = 15 (variable) or 17 (fixed)
//! ```
//!
//! Only the first ten bytes (front, back, count) change after creation.
//! They are rewritten by [`persist_cursors`] after every mutation.

use crate::config::{ElemMode, QueueConfig};
use crate::error::{HeaderError, MediumError, Result};
use crate::medium::{Medium, MediumKind};
use crate::space;

/// Size of the control block when records are variable-size.
pub const BASE_HEADER_SIZE: u32 = 15;

/// Size of the trailing fixed element size field.
const ELEM_SIZE_FIELD: u32 = 2;

/// Bytes covering front, back, and count.
const CURSOR_BYTES: usize = 10;

/// Largest possible control block.
const MAX_HEADER_SIZE: usize = (BASE_HEADER_SIZE + ELEM_SIZE_FIELD) as usize;

const FRONT_OFFSET: usize = 0;
const BACK_OFFSET: usize = 4;
const COUNT_OFFSET: usize = 8;
const MAX_SIZE_OFFSET: usize = 10;
const FLAGS_OFFSET: usize = 14;
const ELEM_SIZE_OFFSET: usize = 15;

/// Flags bit marking fixed-size records.
const FLAG_FIXED_ELEM_SIZE: u8 = 0x01;

/// In-memory copy of a queue's control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Logical index of the oldest unread record.
    pub front_idx: u32,
    /// Logical index where the next record will be written.
    pub back_idx: u32,
    /// Number of live records.
    pub count: u16,
    /// Capacity of the data region in bytes.
    pub max_size: u32,
    /// Record framing. Selects the control block variant and its length.
    pub elem_mode: ElemMode,
    /// Medium the queue was created on.
    pub kind: MediumKind,
}

impl Header {
    /// Control block for a new, empty queue.
    pub fn new(config: &QueueConfig, kind: MediumKind) -> Self {
        Self {
            front_idx: 0,
            back_idx: 0,
            count: 0,
            max_size: config.max_size,
            elem_mode: config.elem_mode(),
            kind,
        }
    }

    /// Offset of the data region, which is also the encoded header length.
    pub fn data_offset(&self) -> u32 {
        match self.elem_mode {
            ElemMode::Variable => BASE_HEADER_SIZE,
            ElemMode::Fixed(_) => BASE_HEADER_SIZE + ELEM_SIZE_FIELD,
        }
    }

    /// Total bytes of control block plus data region.
    pub fn full_size(&self) -> u64 {
        u64::from(self.data_offset()) + u64::from(self.max_size)
    }

    /// The flags byte.
    pub fn flags(&self) -> u8 {
        let fixed = if self.elem_mode.is_fixed() {
            FLAG_FIXED_ELEM_SIZE
        } else {
            0
        };
        fixed | (self.kind.nibble() << 4)
    }

    /// Encodes the full control block.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_HEADER_SIZE);
        buf.extend_from_slice(&self.front_idx.to_le_bytes());
        buf.extend_from_slice(&self.back_idx.to_le_bytes());
        buf.extend_from_slice(&self.count.to_le_bytes());
        buf.extend_from_slice(&self.max_size.to_le_bytes());
        buf.push(self.flags());
        if let ElemMode::Fixed(n) = self.elem_mode {
            buf.extend_from_slice(&n.to_le_bytes());
        }
        buf
    }

    /// Decodes a control block from the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::Short`] if `bytes` ends before the layout
    /// selected by the flags byte, and [`HeaderError::Corrupt`] if the
    /// medium kind is unknown or the fields fail [`Header::validate`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let base = BASE_HEADER_SIZE as usize;
        if bytes.len() < base {
            return Err(HeaderError::Short {
                expected: base,
                read: bytes.len(),
            }
            .into());
        }

        let flags = bytes[FLAGS_OFFSET];
        let elem_mode = if flags & FLAG_FIXED_ELEM_SIZE != 0 {
            if bytes.len() < MAX_HEADER_SIZE {
                return Err(HeaderError::Short {
                    expected: MAX_HEADER_SIZE,
                    read: bytes.len(),
                }
                .into());
            }
            ElemMode::Fixed(le_u16(bytes, ELEM_SIZE_OFFSET))
        } else {
            ElemMode::Variable
        };

        let kind = MediumKind::from_nibble(flags >> 4).ok_or_else(|| HeaderError::Corrupt {
            reason: format!("unknown medium kind {}", flags >> 4),
        })?;

        let header = Self {
            front_idx: le_u32(bytes, FRONT_OFFSET),
            back_idx: le_u32(bytes, BACK_OFFSET),
            count: le_u16(bytes, COUNT_OFFSET),
            max_size: le_u32(bytes, MAX_SIZE_OFFSET),
            elem_mode,
            kind,
        };
        header.validate()?;
        Ok(header)
    }

    /// Checks the fields against the queue invariants.
    ///
    /// There is no checksum, so a control block torn mid-write is only
    /// caught when the torn fields break one of these checks.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::Corrupt`] naming the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(corrupt("max_size is zero"));
        }
        if self.front_idx >= self.max_size || self.back_idx >= self.max_size {
            return Err(corrupt(format!(
                "indices front={} back={} out of range for max_size {}",
                self.front_idx, self.back_idx, self.max_size
            )));
        }
        if self.count == 0 && self.front_idx != self.back_idx {
            return Err(corrupt(format!(
                "empty queue with front={} != back={}",
                self.front_idx, self.back_idx
            )));
        }

        let gross = space::occupied_gross_bytes(self);
        match self.elem_mode {
            ElemMode::Fixed(0) => return Err(corrupt("fixed elem_size is zero")),
            ElemMode::Fixed(n) => {
                if u32::from(self.count) * u32::from(n) != gross {
                    return Err(corrupt(format!(
                        "{} records of {n} bytes do not fill {gross} occupied bytes",
                        self.count
                    )));
                }
            }
            ElemMode::Variable => {
                let needed = u32::from(self.count) * (space::PREFIX_SIZE + 1);
                if gross < needed {
                    return Err(corrupt(format!(
                        "{} records cannot fit in {gross} occupied bytes",
                        self.count
                    )));
                }
            }
        }

        Ok(())
    }
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn corrupt(reason: impl Into<String>) -> crate::error::DurqError {
    HeaderError::Corrupt {
        reason: reason.into(),
    }
    .into()
}

/// Reads and validates the control block of an existing store.
///
/// # Errors
///
/// Returns [`HeaderError::Short`] if the store is too small to hold the
/// control block, [`HeaderError::Corrupt`] if the decoded fields are
/// invalid or the store is smaller than the capacity they declare, and
/// [`MediumError::Io`] if the read fails.
pub fn read_header<M: Medium>(medium: &M) -> Result<Header> {
    let mut buf = [0u8; MAX_HEADER_SIZE];
    let read = medium
        .read_at(0, &mut buf)
        .map_err(|e| MediumError::Io { offset: 0, source: e })?;

    let header = Header::decode(&buf[..read])?;

    if medium.len() < header.full_size() {
        return Err(corrupt(format!(
            "store holds {} bytes, control block declares {}",
            medium.len(),
            header.full_size()
        )));
    }

    Ok(header)
}

/// Writes the full control block.
///
/// # Errors
///
/// Returns [`HeaderError::WriteIncomplete`] on a short write and
/// [`MediumError::Io`] if the write fails.
pub fn write_header<M: Medium>(medium: &mut M, header: &Header) -> Result<()> {
    write_exact(medium, &header.encode())
}

/// Rewrites the mutable fields (front, back, count) of the control block.
///
/// # Errors
///
/// Returns [`HeaderError::WriteIncomplete`] on a short write and
/// [`MediumError::Io`] if the write fails.
pub fn persist_cursors<M: Medium>(medium: &mut M, header: &Header) -> Result<()> {
    write_exact(medium, &header.encode()[..CURSOR_BYTES])
}

fn write_exact<M: Medium>(medium: &mut M, bytes: &[u8]) -> Result<()> {
    let written = medium
        .write_at(0, bytes)
        .map_err(|e| MediumError::Io { offset: 0, source: e })?;

    if written != bytes.len() {
        return Err(HeaderError::WriteIncomplete {
            expected: bytes.len(),
            written,
        }
        .into());
    }
    Ok(())
}
