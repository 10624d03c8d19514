//! The queue engine: enqueue, dequeue, and peek over a persisted ring.
//!
//! A [`CircularQueue`] owns one [`Medium`] and the in-memory copy of its
//! control block. Every mutation follows the same order:
//!
//! 1. write the record bytes into the data region,
//! 2. rewrite front/back/count in the control block and sync,
//! 3. only then replace the in-memory control block.
//!
//! If step 2 fails the call reports an error and the queue keeps its old
//! state. Bytes written in step 1 are unreachable, because the persisted
//! back index never moved past them.
//!
//! Queues are opened and torn down through the lifecycle functions in
//! [`crate::store`].

use std::iter::FusedIterator;

use crate::config::ElemMode;
use crate::error::{MediumError, QueueError, Result};
use crate::header::{self, Header};
use crate::medium::Medium;
use crate::ring::{self, Region};
use crate::space::{self, PREFIX_SIZE};

/// A durable FIFO queue of byte records.
///
/// # Thread Safety
///
/// A queue is designed for one owner on one task. Opening two queues on
/// the same store at once is not supported.
#[derive(Debug)]
pub struct CircularQueue<M: Medium> {
    /// Name of the store within its volume.
    pub(crate) name: String,
    /// Backing store.
    pub(crate) medium: M,
    /// Last successfully persisted control block.
    pub(crate) header: Header,
    /// Exclusive upper bound on variable record lengths (0 = none).
    pub(crate) max_elem_size: u16,
}

impl<M: Medium> CircularQueue<M> {
    /// Appends a record to the back of the queue.
    ///
    /// In fixed mode `payload` must be exactly the configured element size.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidLength`] if the payload is empty, not shorter
    ///   than the configured limit, longer than 65 535 bytes, or the wrong
    ///   size for a fixed-size queue
    /// - [`QueueError::Full`] if the record does not fit
    /// - [`QueueError::CountOverflow`] if 65 535 records are already queued
    /// - medium and header errors if writing or persisting fails; the queue
    ///   state is unchanged in that case
    ///
    /// # Examples
    ///
    /// ```rust
    /// use durq::{CircularQueue, MemVolume, QueueConfig};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut volume = MemVolume::new();
    /// let mut queue = CircularQueue::open(&mut volume, "sensor", &QueueConfig::variable(64))?;
    ///
    /// queue.enqueue(b"reading-1")?;
    /// assert_eq!(queue.len(), 1);
    /// assert_eq!(queue.dequeue()?, Some(b"reading-1".to_vec()));
    /// # Ok(())
    /// # }
    /// ```
    pub fn enqueue(&mut self, payload: &[u8]) -> Result<()> {
        let length = self.check_length(payload)?;
        let mode = self.header.elem_mode;
        let required = space::record_footprint(mode, length);
        let available = self.available_space();

        if available < required {
            return Err(QueueError::Full {
                required,
                available,
            }
            .into());
        }
        if self.header.count == u16::MAX {
            return Err(QueueError::CountOverflow { max: u16::MAX }.into());
        }

        let region = self.region();
        let max_size = self.header.max_size;
        let mut at = self.header.back_idx;
        if mode == ElemMode::Variable {
            ring::write_ring(&mut self.medium, region, at, &length.to_le_bytes())?;
            at = space::next_index(at, PREFIX_SIZE, max_size);
        }
        ring::write_ring(&mut self.medium, region, at, payload)?;

        let next = Header {
            back_idx: space::next_index(self.header.back_idx, required, max_size),
            count: self.header.count + 1,
            ..self.header
        };
        self.commit(next)?;

        tracing::debug!(
            queue = %self.name,
            length,
            back_idx = self.header.back_idx,
            count = self.header.count,
            "enqueued record"
        );
        Ok(())
    }

    /// Returns a copy of the oldest record without removing it.
    ///
    /// Returns `Ok(None)` if the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns medium errors if the read fails, and
    /// [`QueueError::CorruptRecord`] if a stored length prefix is impossible.
    pub fn front(&self) -> Result<Option<Vec<u8>>> {
        if self.is_empty() {
            return Ok(None);
        }
        let (at, length) = self.front_extent()?;
        let payload = ring::read_ring(&self.medium, self.region(), at, usize::from(length))?;
        Ok(Some(payload))
    }

    /// Removes and returns the oldest record.
    ///
    /// Returns `Ok(None)` if the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns medium errors if reading or persisting fails, and
    /// [`QueueError::CorruptRecord`] if a stored length prefix is impossible.
    /// The queue state is unchanged on error.
    pub fn dequeue(&mut self) -> Result<Option<Vec<u8>>> {
        if self.is_empty() {
            return Ok(None);
        }
        let (at, length) = self.front_extent()?;
        let payload = ring::read_ring(&self.medium, self.region(), at, usize::from(length))?;
        self.advance_front(length)?;
        Ok(Some(payload))
    }

    /// Removes the oldest record without copying its payload out.
    ///
    /// Returns `Ok(false)` if the queue is empty.
    ///
    /// # Errors
    ///
    /// Same as [`CircularQueue::dequeue`].
    pub fn pop(&mut self) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }
        let (_, length) = self.front_extent()?;
        self.advance_front(length)?;
        Ok(true)
    }

    /// Dequeues every record, oldest first.
    ///
    /// The iterator consumes records as it goes: each item has already
    /// been removed from the queue and persisted. Dropping it early leaves
    /// the remaining records in place. It ends when the queue is empty or
    /// after yielding the first error.
    pub fn drain(&mut self) -> Drain<'_, M> {
        Drain {
            queue: self,
            done: false,
        }
    }

    /// Flushes the backing store.
    ///
    /// # Errors
    ///
    /// Returns [`MediumError::SyncFailed`] if the flush fails.
    pub fn sync(&mut self) -> Result<()> {
        self.medium.sync().map_err(|e| {
            MediumError::SyncFailed {
                name: self.name.clone(),
                source: e,
            }
            .into()
        })
    }

    /// Returns `true` if the queue holds no records.
    pub fn is_empty(&self) -> bool {
        self.header.count == 0
    }

    /// Number of records in the queue.
    pub fn len(&self) -> u16 {
        self.header.count
    }

    /// Payload bytes held by the queue, excluding length prefixes.
    pub fn size(&self) -> u32 {
        space::occupied_net_bytes(&self.header)
    }

    /// Bytes available to the next record.
    pub fn available_space(&self) -> u32 {
        space::available_space(&self.header)
    }

    /// Logical index of the oldest record.
    pub fn front_idx(&self) -> u32 {
        self.header.front_idx
    }

    /// Logical index where the next record will be written.
    pub fn back_idx(&self) -> u32 {
        self.header.back_idx
    }

    /// Capacity of the data region in bytes.
    pub fn max_size(&self) -> u32 {
        self.header.max_size
    }

    /// Record framing of this queue.
    pub fn elem_mode(&self) -> ElemMode {
        self.header.elem_mode
    }

    /// Physical offset of the data region.
    pub fn data_offset(&self) -> u32 {
        self.header.data_offset()
    }

    /// Size of the backing store in bytes.
    pub fn footprint(&self) -> u64 {
        self.medium.len()
    }

    /// Name of the store within its volume.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The in-memory control block.
    pub fn header(&self) -> &Header {
        &self.header
    }

    fn region(&self) -> Region {
        Region::new(self.header.data_offset(), self.header.max_size)
    }

    /// Validates a payload and returns its length as stored.
    fn check_length(&self, payload: &[u8]) -> Result<u16> {
        let invalid = |reason: String| QueueError::InvalidLength {
            length: payload.len(),
            reason,
        };

        match self.header.elem_mode {
            ElemMode::Fixed(n) => {
                if payload.len() != usize::from(n) {
                    return Err(invalid(format!("fixed-size queue stores {n}-byte records")).into());
                }
                Ok(n)
            }
            ElemMode::Variable => {
                if payload.is_empty() {
                    return Err(invalid("records cannot be empty".to_string()).into());
                }
                let length = u16::try_from(payload.len())
                    .map_err(|_| invalid(format!("records are limited to {} bytes", u16::MAX)))?;
                if self.max_elem_size > 0 && length >= self.max_elem_size {
                    return Err(invalid(format!(
                        "records must be shorter than {} bytes",
                        self.max_elem_size
                    ))
                    .into());
                }
                Ok(length)
            }
        }
    }

    /// Locates the oldest record's payload: its logical index and length.
    fn front_extent(&self) -> Result<(u32, u16)> {
        let front = self.header.front_idx;
        match self.header.elem_mode {
            ElemMode::Fixed(n) => Ok((front, n)),
            ElemMode::Variable => {
                let prefix =
                    ring::read_ring(&self.medium, self.region(), front, PREFIX_SIZE as usize)?;
                let length = u16::from_le_bytes([prefix[0], prefix[1]]);

                let occupied = space::occupied_gross_bytes(&self.header);
                if length == 0 || space::record_footprint(ElemMode::Variable, length) > occupied {
                    return Err(QueueError::CorruptRecord {
                        index: front,
                        length,
                        occupied,
                    }
                    .into());
                }
                Ok((space::next_index(front, PREFIX_SIZE, self.header.max_size), length))
            }
        }
    }

    /// Drops the oldest record, whose payload is `length` bytes long.
    fn advance_front(&mut self, length: u16) -> Result<()> {
        let footprint = space::record_footprint(self.header.elem_mode, length);
        let next = Header {
            front_idx: space::next_index(self.header.front_idx, footprint, self.header.max_size),
            count: self.header.count - 1,
            ..self.header
        };
        self.commit(next)?;

        tracing::debug!(
            queue = %self.name,
            length,
            front_idx = self.header.front_idx,
            count = self.header.count,
            "dequeued record"
        );
        Ok(())
    }

    /// Persists `next` and adopts it as the queue state.
    fn commit(&mut self, next: Header) -> Result<()> {
        let persisted = header::persist_cursors(&mut self.medium, &next).and_then(|()| self.sync());
        if let Err(e) = persisted {
            tracing::warn!(
                queue = %self.name,
                error = %e,
                "control block not persisted; keeping previous state"
            );
            return Err(e);
        }
        self.header = next;
        Ok(())
    }
}

/// Consuming iterator returned by [`CircularQueue::drain`].
#[derive(Debug)]
pub struct Drain<'a, M: Medium> {
    queue: &'a mut CircularQueue<M>,
    done: bool,
}

impl<M: Medium> Iterator for Drain<'_, M> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.queue.dequeue() {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, Some(usize::from(self.queue.len()) + 1))
        }
    }
}

impl<M: Medium> FusedIterator for Drain<'_, M> {}
