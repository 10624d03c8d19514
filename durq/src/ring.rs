//! Wraparound reads and writes over the data region.
//!
//! The data region is `max_size` bytes starting at `data_offset`. A byte run
//! that starts at logical index `i` and would run past the end of the region
//! is split in two: the head is transferred at `data_offset + i`, the tail at
//! `data_offset` (logical index 0). These functions only move bytes; they
//! never compute or advance queue indices.

use crate::error::{MediumError, QueueError, Result};
use crate::medium::Medium;

/// Placement of the data region inside the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Physical offset of logical index 0.
    pub data_offset: u32,
    /// Length of the region in bytes.
    pub max_size: u32,
}

impl Region {
    /// Creates a region descriptor.
    pub fn new(data_offset: u32, max_size: u32) -> Self {
        Self {
            data_offset,
            max_size,
        }
    }

    /// Physical end of the region (header plus data).
    pub fn full_size(&self) -> u64 {
        u64::from(self.data_offset) + u64::from(self.max_size)
    }

    /// Physical offset of a logical index.
    pub fn physical(&self, logical: u32) -> u64 {
        u64::from(self.data_offset) + u64::from(logical)
    }

    /// Splits a run of `len` bytes at `logical` into the lengths transferred
    /// before and after the wrap point.
    #[allow(clippy::cast_possible_truncation)] // head is bounded by len (usize)
    pub fn split(&self, logical: u32, len: usize) -> (usize, usize) {
        let until_end = self.full_size() - self.physical(logical);
        if (len as u64) > until_end {
            let head = until_end as usize;
            (head, len - head)
        } else {
            (len, 0)
        }
    }

    fn check(&self, logical: u32, len: usize) -> Result<()> {
        if logical >= self.max_size || len as u64 > u64::from(self.max_size) {
            return Err(QueueError::InvalidLength {
                length: len,
                reason: format!(
                    "run at index {logical} does not fit a {}-byte region",
                    self.max_size
                ),
            }
            .into());
        }
        Ok(())
    }
}

/// Writes `data` at logical index `logical`, wrapping at the end of the region.
///
/// # Errors
///
/// Returns [`MediumError::PartialIo`] if fewer than `data.len()` bytes were
/// written across both parts, [`MediumError::Io`] if a write fails, and
/// [`QueueError::InvalidLength`] if the run is longer than the region.
pub fn write_ring<M: Medium>(
    medium: &mut M,
    region: Region,
    logical: u32,
    data: &[u8],
) -> Result<()> {
    region.check(logical, data.len())?;
    let (head, tail) = region.split(logical, data.len());
    let start = region.physical(logical);

    let mut written = write_part(medium, start, &data[..head])?;
    if written == head && tail > 0 {
        written += write_part(medium, u64::from(region.data_offset), &data[head..])?;
    }

    if written != data.len() {
        return Err(MediumError::PartialIo {
            offset: start,
            requested: data.len(),
            transferred: written,
        }
        .into());
    }
    Ok(())
}

/// Reads `len` bytes at logical index `logical`, wrapping at the end of the region.
///
/// # Errors
///
/// Returns [`MediumError::PartialIo`] if fewer than `len` bytes were read
/// across both parts, [`MediumError::Io`] if a read fails, and
/// [`QueueError::InvalidLength`] if the run is longer than the region.
pub fn read_ring<M: Medium>(
    medium: &M,
    region: Region,
    logical: u32,
    len: usize,
) -> Result<Vec<u8>> {
    region.check(logical, len)?;
    let (head, _) = region.split(logical, len);
    let start = region.physical(logical);

    let mut buf = vec![0u8; len];
    let (first, second) = buf.split_at_mut(head);
    let mut read = read_part(medium, start, first)?;
    if read == head && !second.is_empty() {
        read += read_part(medium, u64::from(region.data_offset), second)?;
    }

    if read != len {
        return Err(MediumError::PartialIo {
            offset: start,
            requested: len,
            transferred: read,
        }
        .into());
    }
    Ok(buf)
}

fn write_part<M: Medium>(medium: &mut M, offset: u64, data: &[u8]) -> Result<usize> {
    Ok(medium
        .write_at(offset, data)
        .map_err(|e| MediumError::Io { offset, source: e })?)
}

fn read_part<M: Medium>(medium: &M, offset: u64, buf: &mut [u8]) -> Result<usize> {
    Ok(medium
        .read_at(offset, buf)
        .map_err(|e| MediumError::Io { offset, source: e })?)
}
