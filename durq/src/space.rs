//! Occupancy and free-space arithmetic over the ring's logical index space.
//!
//! Everything here is pure. Indices live in `0..max_size`; when
//! `front_idx == back_idx` the record count alone decides whether the ring
//! is empty or completely full, which is why the count is persisted rather
//! than derived.

use crate::config::ElemMode;
use crate::header::Header;

/// Size of the length prefix in front of each variable-size record.
pub const PREFIX_SIZE: u32 = 2;

/// Bytes between front and back, framing included.
pub fn occupied_gross_bytes(header: &Header) -> u32 {
    let Header {
        front_idx,
        back_idx,
        count,
        max_size,
        ..
    } = *header;

    if back_idx > front_idx {
        back_idx - front_idx
    } else if back_idx < front_idx {
        max_size - front_idx + back_idx
    } else if count > 0 {
        max_size
    } else {
        0
    }
}

/// Total framing bytes of all live records.
pub fn framing_bytes(header: &Header) -> u32 {
    u32::from(header.count) * header.elem_mode.overhead()
}

/// Payload bytes held by the queue, excluding length prefixes.
pub fn occupied_net_bytes(header: &Header) -> u32 {
    occupied_gross_bytes(header).saturating_sub(framing_bytes(header))
}

/// Bytes available to the next record.
///
/// In variable mode one prefix's worth of slack is held back so the next
/// record's length prefix always fits.
pub fn available_space(header: &Header) -> u32 {
    let used = occupied_net_bytes(header) + framing_bytes(header);
    let gross = header.max_size.saturating_sub(used);
    let next_overhead = header.elem_mode.overhead();

    if gross <= next_overhead {
        0
    } else {
        gross - next_overhead
    }
}

/// Bytes a record of `length` payload bytes occupies in the ring.
pub fn record_footprint(mode: ElemMode, length: u16) -> u32 {
    match mode {
        ElemMode::Variable => PREFIX_SIZE + u32::from(length),
        ElemMode::Fixed(n) => u32::from(n),
    }
}

/// Advances a logical index, wrapping at `max_size`.
#[inline]
#[allow(clippy::cast_possible_truncation)] // Result is below max_size (u32)
pub fn next_index(idx: u32, advance: u32, max_size: u32) -> u32 {
    ((u64::from(idx) + u64::from(advance)) % u64::from(max_size)) as u32
}
