//! Queue lifecycle: open-or-create, recovery, and teardown.
//!
//! # Recovery
//!
//! Opening a store that already exists never rewrites it. The control block
//! is read back and becomes the queue state, so a process that died
//! mid-operation resumes exactly where the last successful persist left it.
//! Opening the same store again is equally harmless.
//!
//! A store that exists but is empty (creation interrupted before the
//! control block was written) is initialized as a new queue.

use crate::config::QueueConfig;
use crate::error::{MediumError, Result};
use crate::header::{self, Header};
use crate::medium::{Medium, Volume};
use crate::queue::CircularQueue;

impl<M: Medium> CircularQueue<M> {
    /// Opens the queue stored as `name` on `volume`, creating it if needed.
    ///
    /// The volume is mounted first if it is not already. For a new store,
    /// `config` decides the capacity and record framing. For an existing
    /// store the persisted control block wins; a disagreeing `config` is
    /// logged and otherwise ignored, except for `max_elem_size`, which is
    /// never persisted and always taken from `config`.
    ///
    /// # Errors
    ///
    /// - [`MediumError::Unavailable`] if the volume cannot be mounted or the
    ///   store cannot be created or opened
    /// - [`crate::error::ConfigError::Invalid`] if a new store would be
    ///   created from an invalid `config`
    /// - [`crate::error::HeaderError`] if the control block cannot be written
    ///   or an existing one cannot be read back
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use durq::{CircularQueue, DirVolume, QueueConfig};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut volume = DirVolume::new("./queues");
    /// let mut queue = CircularQueue::open(&mut volume, "telemetry", &QueueConfig::default())?;
    /// queue.enqueue(b"boot")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<V>(volume: &mut V, name: &str, config: &QueueConfig) -> Result<Self>
    where
        V: Volume<Medium = M>,
    {
        if !volume.is_mounted() {
            volume.mount().map_err(|e| unavailable(name, e))?;
            tracing::debug!(queue = %name, "mounted volume");
        }

        match volume.stat(name).map_err(|e| unavailable(name, e))? {
            Some(len) if len > 0 => Self::open_existing(volume, name, config),
            _ => Self::create_new(volume, name, config),
        }
    }

    /// Creates a zero-filled store and writes a fresh control block.
    fn create_new<V>(volume: &mut V, name: &str, config: &QueueConfig) -> Result<Self>
    where
        V: Volume<Medium = M>,
    {
        config.validate()?;

        let header = Header::new(config, volume.kind());
        let mut medium = volume
            .create(name, header.full_size())
            .map_err(|e| unavailable(name, e))?;

        let initialized = header::write_header(&mut medium, &header).and_then(|()| {
            medium.sync().map_err(|e| {
                MediumError::SyncFailed {
                    name: name.to_string(),
                    source: e,
                }
                .into()
            })
        });
        if let Err(e) = initialized {
            drop(medium);
            if let Err(cleanup) = volume.remove(name) {
                tracing::warn!(
                    queue = %name,
                    error = %cleanup,
                    "failed to remove half-created store"
                );
            }
            return Err(e);
        }

        tracing::info!(
            queue = %name,
            max_size = header.max_size,
            elem_mode = ?header.elem_mode,
            footprint = header.full_size(),
            "created queue"
        );

        Ok(Self {
            name: name.to_string(),
            medium,
            header,
            max_elem_size: config.max_elem_size,
        })
    }

    /// Opens a store and adopts its persisted control block.
    fn open_existing<V>(volume: &mut V, name: &str, config: &QueueConfig) -> Result<Self>
    where
        V: Volume<Medium = M>,
    {
        let medium = volume.open(name).map_err(|e| unavailable(name, e))?;
        let header = header::read_header(&medium)?;

        if header.max_size != config.max_size || header.elem_mode != config.elem_mode() {
            tracing::warn!(
                queue = %name,
                persisted_max_size = header.max_size,
                persisted_elem_mode = ?header.elem_mode,
                requested_max_size = config.max_size,
                requested_elem_mode = ?config.elem_mode(),
                "configuration differs from existing queue; using persisted values"
            );
        }

        tracing::info!(
            queue = %name,
            front_idx = header.front_idx,
            back_idx = header.back_idx,
            count = header.count,
            "recovered queue"
        );

        Ok(Self {
            name: name.to_string(),
            medium,
            header,
            max_elem_size: config.max_elem_size,
        })
    }

    /// Re-reads the persisted control block and adopts it.
    ///
    /// On a queue whose state is fully persisted this changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::HeaderError`] if the control block cannot be
    /// read or is corrupt; the in-memory state is kept in that case.
    pub fn reload(&mut self) -> Result<()> {
        let header = header::read_header(&self.medium)?;
        if header != self.header {
            tracing::info!(
                queue = %self.name,
                front_idx = header.front_idx,
                back_idx = header.back_idx,
                count = header.count,
                "reloaded control block"
            );
        }
        self.header = header;
        Ok(())
    }

    /// Deletes the queue's store and everything in it.
    ///
    /// If `unmount` is `true` the volume is released afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`MediumError::Unavailable`] if the store cannot be removed
    /// or the volume cannot be unmounted.
    pub fn free<V>(self, volume: &mut V, unmount: bool) -> Result<()>
    where
        V: Volume<Medium = M>,
    {
        let Self {
            name,
            medium,
            header,
            ..
        } = self;
        drop(medium);

        volume.remove(&name).map_err(|e| unavailable(&name, e))?;
        if unmount {
            volume.unmount().map_err(|e| unavailable(&name, e))?;
        }

        tracing::info!(queue = %name, discarded = header.count, unmount, "freed queue");
        Ok(())
    }
}

fn unavailable(name: &str, source: std::io::Error) -> MediumError {
    MediumError::Unavailable {
        name: name.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElemMode;
    use crate::error::{ConfigError, DurqError, HeaderError};
    use crate::medium::{MediumKind, MemMedium, MemVolume};

    #[test]
    fn test_open_creates_and_mounts() {
        let mut volume = MemVolume::new();
        let queue = CircularQueue::open(&mut volume, "q", &QueueConfig::variable(32)).unwrap();

        assert!(volume.is_mounted());
        assert!(queue.is_empty());
        assert_eq!(queue.footprint(), 47);
        assert_eq!(queue.header().kind, MediumKind::Memory);

        let raw = volume.snapshot("q").unwrap();
        assert_eq!(raw.len(), 47);
        assert_eq!(&raw[10..14], &32u32.to_le_bytes());
        assert_eq!(raw[14], 0x40);
    }

    #[test]
    fn test_reopen_recovers_state() {
        let mut volume = MemVolume::new();
        {
            let mut queue =
                CircularQueue::open(&mut volume, "q", &QueueConfig::variable(32)).unwrap();
            queue.enqueue(b"first").unwrap();
            queue.enqueue(b"second").unwrap();
            queue.dequeue().unwrap();
        }

        // A different config does not override what is on the medium.
        let mut queue = CircularQueue::open(&mut volume, "q", &QueueConfig::fixed(64, 4)).unwrap();
        assert_eq!(queue.max_size(), 32);
        assert_eq!(queue.elem_mode(), ElemMode::Variable);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front_idx(), 7);
        assert_eq!(queue.dequeue().unwrap().unwrap(), b"second");
    }

    #[test]
    fn test_double_open_is_harmless() {
        let mut volume = MemVolume::new();
        let config = QueueConfig::variable(32);
        let mut first: CircularQueue<MemMedium> =
            CircularQueue::open(&mut volume, "q", &config).unwrap();
        first.enqueue(b"abc").unwrap();
        let before = volume.snapshot("q").unwrap();

        let second = CircularQueue::open(&mut volume, "q", &config).unwrap();
        assert_eq!(second.header(), first.header());
        assert_eq!(volume.snapshot("q").unwrap(), before);
    }

    #[test]
    fn test_invalid_config_creates_nothing() {
        let mut volume = MemVolume::new();
        let err = CircularQueue::open(&mut volume, "q", &QueueConfig::variable(0)).unwrap_err();

        assert!(matches!(err, DurqError::Config(ConfigError::Invalid { .. })));
        assert_eq!(volume.stat("q").unwrap(), None);
    }

    #[test]
    fn test_mount_failure_is_unavailable() {
        let mut volume = MemVolume::new();
        volume.set_mount_failure(true);

        let err = CircularQueue::open(&mut volume, "q", &QueueConfig::default()).unwrap_err();
        assert!(matches!(err, DurqError::Medium(MediumError::Unavailable { .. })));
    }

    #[test]
    fn test_short_initial_header_write() {
        let mut volume = MemVolume::new();
        volume.set_write_budget(Some(4));

        let err = CircularQueue::open(&mut volume, "q", &QueueConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            DurqError::Header(HeaderError::WriteIncomplete {
                expected: 15,
                written: 4
            })
        ));
        assert_eq!(volume.stat("q").unwrap(), None);
    }

    #[test]
    fn test_empty_store_is_initialized() {
        let mut volume = MemVolume::new();
        volume.mount().unwrap();
        volume.create("q", 0).unwrap();

        let queue = CircularQueue::open(&mut volume, "q", &QueueConfig::variable(16)).unwrap();
        assert_eq!(queue.max_size(), 16);
        assert_eq!(volume.stat("q").unwrap(), Some(31));
    }

    #[test]
    fn test_reload_picks_up_persisted_state() {
        let mut volume = MemVolume::new();
        let config = QueueConfig::variable(32);
        let mut reader = CircularQueue::open(&mut volume, "q", &config).unwrap();
        let mut writer = CircularQueue::open(&mut volume, "q", &config).unwrap();

        writer.enqueue(b"xyz").unwrap();
        assert!(reader.is_empty());

        reader.reload().unwrap();
        assert_eq!(reader.len(), 1);
        let before = *reader.header();
        reader.reload().unwrap();
        assert_eq!(*reader.header(), before);
    }

    #[test]
    fn test_free_removes_store() {
        let mut volume = MemVolume::new();
        let mut queue = CircularQueue::open(&mut volume, "q", &QueueConfig::variable(32)).unwrap();
        queue.enqueue(b"gone").unwrap();

        queue.free(&mut volume, true).unwrap();
        assert!(!volume.is_mounted());

        // Reopening mounts again and starts from scratch.
        let queue = CircularQueue::open(&mut volume, "q", &QueueConfig::variable(32)).unwrap();
        assert!(queue.is_empty());
    }
}
