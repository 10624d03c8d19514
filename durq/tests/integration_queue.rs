//! Integration tests for queue operations over on-disk stores.
//!
//! These cover FIFO ordering, records that straddle the end of the data
//! region, capacity boundaries, and the two record framings.

use durq::error::{DurqError, QueueError};
use durq::{CircularQueue, DirVolume, ElemMode, FileMedium, QueueConfig, Volume};
use tempfile::tempdir;

fn open(volume: &mut DirVolume, name: &str, config: &QueueConfig) -> CircularQueue<FileMedium> {
    CircularQueue::open(volume, name, config).unwrap()
}

#[test]
fn test_fill_until_full_then_wrap() {
    let temp_dir = tempdir().unwrap();
    let mut volume = DirVolume::new(temp_dir.path());
    let mut queue = open(&mut volume, "q", &QueueConfig::variable(64));

    // 10-byte records take 12 bytes each; the fifth leaves 2 spare bytes.
    let mut accepted = 0u8;
    loop {
        match queue.enqueue(&[accepted; 10]) {
            Ok(()) => accepted += 1,
            Err(DurqError::Queue(QueueError::Full { .. })) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(accepted, 5);
    assert_eq!(queue.back_idx(), 60);
    assert_eq!(queue.available_space(), 2);

    // Even a 1-byte record needs its 2-byte prefix on top.
    assert!(matches!(
        queue.enqueue(&[9]).unwrap_err(),
        DurqError::Queue(QueueError::Full {
            required: 3,
            available: 2
        })
    ));

    assert_eq!(queue.dequeue().unwrap().unwrap(), vec![0; 10]);
    assert_eq!(queue.dequeue().unwrap().unwrap(), vec![1; 10]);

    // The first refill straddles the end of the region.
    queue.enqueue(&[5; 10]).unwrap();
    assert_eq!(queue.back_idx(), 8);
    queue.enqueue(&[6; 10]).unwrap();
    assert_eq!(queue.back_idx(), 20);
    assert!(queue.enqueue(&[7; 10]).is_err());

    let drained: Vec<Vec<u8>> = queue.drain().map(|r| r.unwrap()).collect();
    let expected: Vec<Vec<u8>> = (2..=6).map(|i| vec![i; 10]).collect();
    assert_eq!(drained, expected);
    assert!(queue.is_empty());
    assert_eq!(queue.front_idx(), queue.back_idx());
}

#[test]
fn test_length_prefix_split_at_last_byte() {
    let temp_dir = tempdir().unwrap();
    let mut volume = DirVolume::new(temp_dir.path());
    let mut queue = open(&mut volume, "q", &QueueConfig::variable(16));

    queue.enqueue(&[0xEE; 3]).unwrap();
    queue.pop().unwrap();
    queue.enqueue(&[0xEE; 8]).unwrap();
    assert_eq!(queue.back_idx(), 15);
    queue.pop().unwrap();

    // Prefix byte 0 lands at index 15, byte 1 at index 0.
    queue.enqueue(b"abc").unwrap();
    assert_eq!(queue.back_idx(), 4);
    queue.sync().unwrap();

    let raw = std::fs::read(temp_dir.path().join("q")).unwrap();
    assert_eq!(raw[15 + 15], 3);
    assert_eq!(raw[15], 0);
    assert_eq!(&raw[16..19], b"abc");

    assert_eq!(queue.front().unwrap().unwrap(), b"abc");
    assert_eq!(queue.dequeue().unwrap().unwrap(), b"abc");
    assert_eq!(queue.front_idx(), 4);
}

#[test]
fn test_available_space_after_one_record() {
    let temp_dir = tempdir().unwrap();
    let mut volume = DirVolume::new(temp_dir.path());
    let mut queue = open(&mut volume, "q", &QueueConfig::default());

    assert_eq!(queue.available_space(), 2048 - 2);
    queue.enqueue(&[0x5A; 255]).unwrap();
    assert_eq!(queue.available_space(), 2048 - (255 + 2) - 2);
    assert_eq!(queue.size(), 255);
    assert_eq!(queue.footprint(), 15 + 2048);
}

#[test]
fn test_checksums_survive_wraparound() {
    let temp_dir = tempdir().unwrap();
    let mut volume = DirVolume::new(temp_dir.path());
    let mut queue = open(&mut volume, "q", &QueueConfig::variable(100));

    let mut next = 0u32;
    let mut expected_sum = 0u64;
    let mut actual_sum = 0u64;

    // Odd record lengths walk the cursors across every alignment.
    for round in 0..40u32 {
        let len = (round % 17 + 1) as usize;
        let record: Vec<u8> = (0..len)
            .map(|_| {
                next += 1;
                (next % 251) as u8
            })
            .collect();

        while queue.enqueue(&record).is_err() {
            let out = queue.dequeue().unwrap().unwrap();
            actual_sum += out.iter().map(|&b| u64::from(b)).sum::<u64>();
        }
        expected_sum += record.iter().map(|&b| u64::from(b)).sum::<u64>();
    }
    for record in queue.drain() {
        actual_sum += record.unwrap().iter().map(|&b| u64::from(b)).sum::<u64>();
    }

    assert_eq!(actual_sum, expected_sum);
}

#[test]
fn test_fixed_size_records() {
    let temp_dir = tempdir().unwrap();
    let mut volume = DirVolume::new(temp_dir.path());
    let mut queue = open(&mut volume, "fixed", &QueueConfig::fixed(10, 4));

    assert_eq!(queue.elem_mode(), ElemMode::Fixed(4));
    assert_eq!(queue.data_offset(), 17);
    assert_eq!(queue.footprint(), 27);

    queue.enqueue(b"aaaa").unwrap();
    queue.enqueue(b"bbbb").unwrap();
    assert_eq!(queue.available_space(), 2);
    assert!(matches!(
        queue.enqueue(b"cccc").unwrap_err(),
        DurqError::Queue(QueueError::Full {
            required: 4,
            available: 2
        })
    ));

    // Next record starts at 8 and wraps after two bytes.
    assert_eq!(queue.dequeue().unwrap().unwrap(), b"aaaa");
    queue.enqueue(b"cdef").unwrap();
    assert_eq!(queue.back_idx(), 2);

    assert_eq!(queue.dequeue().unwrap().unwrap(), b"bbbb");
    assert_eq!(queue.dequeue().unwrap().unwrap(), b"cdef");
    assert_eq!(queue.dequeue().unwrap(), None);
}

#[test]
fn test_independent_queues() {
    let temp_dir = tempdir().unwrap();
    let mut volume = DirVolume::new(temp_dir.path());
    let mut left = open(&mut volume, "left", &QueueConfig::variable(64));
    let mut right = open(&mut volume, "right", &QueueConfig::fixed(64, 2));

    for i in 0..5u8 {
        left.enqueue(&[i; 3]).unwrap();
        right.enqueue(&[i, i]).unwrap();
        if i % 2 == 1 {
            left.pop().unwrap();
        }
    }

    assert_eq!(left.len(), 3);
    assert_eq!(right.len(), 5);
    assert_eq!(left.front().unwrap().unwrap(), vec![2; 3]);
    assert_eq!(right.front().unwrap().unwrap(), vec![0, 0]);
    assert_eq!(volume.stat("left").unwrap(), Some(15 + 64));
    assert_eq!(volume.stat("right").unwrap(), Some(17 + 64));
}

#[test]
fn test_count_overflow() {
    let mut volume = durq::MemVolume::new();
    let mut queue =
        CircularQueue::open(&mut volume, "many", &QueueConfig::fixed(70_000, 1)).unwrap();

    for _ in 0..u16::MAX {
        queue.enqueue(&[1]).unwrap();
    }
    assert_eq!(queue.len(), u16::MAX);
    assert!(queue.available_space() > 0);

    let err = queue.enqueue(&[1]).unwrap_err();
    assert!(matches!(
        err,
        DurqError::Queue(QueueError::CountOverflow { max: u16::MAX })
    ));
}
