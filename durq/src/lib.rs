//! # durq
//!
//! Durable fixed-capacity circular queue stored in a single file.
//!
//! durq keeps a FIFO of byte records in one pre-allocated store: a small
//! control block followed by a ring-shaped data region. Every enqueue and
//! dequeue persists the queue cursors before it returns, so a process that
//! is killed at any point reopens the queue exactly as of the last
//! operation that reported success.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Bounded, predictable storage: the file size is fixed at creation
//! - Variable-size records with a 16-bit length prefix, or fixed-size records
//! - Records may straddle the end of the data region
//! - Self-describing files; reopening recovers the persisted state
//! - No background threads and no internal locking
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use durq::{CircularQueue, DirVolume, QueueConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // A 4 KiB queue of variable-size records
//! let mut volume = DirVolume::new("./queues");
//! let mut queue = CircularQueue::open(&mut volume, "events", &QueueConfig::variable(4096))?;
//!
//! queue.enqueue(b"door opened")?;
//! queue.enqueue(b"door closed")?;
//!
//! // Peek, then consume
//! assert_eq!(queue.front()?.as_deref(), Some(&b"door opened"[..]));
//! for record in queue.drain() {
//!     println!("{}", String::from_utf8_lossy(&record?));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`CircularQueue`]: Queue handle; enqueue, dequeue, peek, drain
//! - [`QueueConfig`]: Capacity and record framing for new queues
//! - [`Volume`] / [`Medium`]: Storage a queue lives on
//! - [`DirVolume`]: Memory-mapped files in a directory
//! - [`MemVolume`]: Heap storage, with fault injection for tests
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`queue`]: Queue engine
//! - [`store`]: Open, recover, reload, and free
//! - [`header`]: Control block codec
//! - [`space`]: Occupancy and free-space arithmetic
//! - [`ring`]: Wraparound reads and writes
//! - [`medium`]: Storage traits and implementations
//! - [`config`]: Queue configuration
//! - [`error`]: Error types

pub mod config;
pub mod error;
pub mod header;
pub mod medium;
pub mod queue;
pub mod ring;
pub mod space;
pub mod store;

// Re-export primary API types at crate root for convenience.
pub use config::{ElemMode, QueueConfig};
pub use error::{DurqError, Result};
pub use header::Header;
pub use medium::{DirVolume, FileMedium, Medium, MediumKind, MemMedium, MemVolume, Volume};
pub use queue::{CircularQueue, Drain};
