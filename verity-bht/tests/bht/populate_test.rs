//! 读取发起与完成回调测试

use std::io;

use verity_bht::{Bht, BhtError, EntryState, HashAlgorithm, MemoryHashStore, ReadRequest};

use crate::common::sample_data::random_image;
use crate::common::test_helpers::{build_tree, init_logger, open_verifier, FaultyReader, QueuedReader};

/// Helper: a blake2b verifier (fan-out 64) whose reads wait for the test
fn queued_verifier(block_count: u64, seed: u64) -> (Bht, QueuedReader, Vec<Vec<u8>>) {
    init_logger();
    let blocks = random_image(block_count, seed);
    let builder = build_tree(&blocks, HashAlgorithm::Blake2b512, None);
    let reader = QueuedReader::new(MemoryHashStore::from_region(builder.region()));
    let mut bht = open_verifier(&builder);
    bht.set_read_callback(reader.clone());
    (bht, reader, blocks)
}

/// Test: one read per unallocated entry, none for pending ones
#[test]
fn test_reads_only_unallocated_entries() {
    let (bht, reader, _) = queued_verifier(64 * 64 + 1, 1);
    assert_eq!(bht.depth(), 3);

    // Whole path, leaf first
    assert_eq!(bht.populate(&(), 4096).unwrap(), 3);
    let levels: Vec<usize> = reader.take().iter().map(ReadRequest::level).collect();
    assert_eq!(levels, vec![2, 1, 0]);
    for level in 0..3 {
        let index = bht.geometry().entry_index(level, 4096);
        assert_eq!(bht.entry_state(level, index), Some(EntryState::IoError));
    }

    // Fresh tree: a neighbour sharing the upper levels only needs its leaf
    let (bht, reader, blocks) = queued_verifier(64 * 64 + 1, 1);
    assert_eq!(bht.populate(&(), 0).unwrap(), 3);
    assert_eq!(bht.populate(&(), 64).unwrap(), 1);
    assert_eq!(bht.populate(&(), 65).unwrap(), 0);
    assert_eq!(reader.outstanding(), 4);

    assert_eq!(reader.complete_all(), 4);
    assert!(bht.is_populated(0));
    assert!(bht.is_populated(65));
    assert!(!bht.is_populated(128));
    bht.verify(65, &blocks[65]).unwrap();
    bht.verify(0, &blocks[0]).unwrap();

    // Verified upper levels are not walked again
    assert_eq!(bht.populate(&(), 128).unwrap(), 1);
    assert_eq!(reader.complete_all(), 1);
    bht.verify(128, &blocks[128]).unwrap();
}

/// Test: nothing is populated until every completion has arrived
#[test]
fn test_out_of_order_completion() {
    let (bht, reader, blocks) = queued_verifier(64 * 3, 2);
    assert_eq!(bht.populate(&(), 100).unwrap(), 2);

    let mut requests = reader.take();
    let apex = requests.pop().unwrap();
    assert_eq!(apex.level(), 0);
    assert_eq!(apex.start_sector(), 0);
    reader.serve(apex);
    assert!(!bht.is_populated(100));
    assert_eq!(bht.verify(100, &blocks[100]), Err(BhtError::NotPopulated(100)));

    let leaf = requests.pop().unwrap();
    assert_eq!((leaf.level(), leaf.entry_index()), (1, 1));
    assert_eq!(leaf.start_sector(), 16);
    assert_eq!(leaf.sector_count(), 8);
    reader.serve(leaf);
    assert!(bht.is_populated(100));
    bht.verify(100, &blocks[100]).unwrap();
}

/// Test: a failed leaf read poisons only the blocks under it
#[test]
fn test_io_failure_isolation() {
    init_logger();
    let blocks = random_image(400, 3);
    let builder = build_tree(&blocks, HashAlgorithm::Sha256, None);
    let mut bht = open_verifier(&builder);
    let bad_sector = bht.geometry().sector_of(1, 2);
    bht.set_read_callback(FaultyReader {
        store: MemoryHashStore::from_region(builder.region()),
        bad_sector,
    });

    // Leaf entry 2 covers blocks 256..384
    assert_eq!(bht.populate(&(), 300).unwrap(), 2);
    assert_eq!(bht.entry_state(1, 2), Some(EntryState::IoError));
    assert!(!bht.is_populated(300));
    assert_eq!(
        bht.verify(300, &blocks[300]),
        Err(BhtError::Io { level: 1, index: 2 })
    );
    assert_eq!(
        bht.check_block(&(), 383, &blocks[383]),
        Err(BhtError::Io { level: 1, index: 2 })
    );

    for block in [0u64, 255, 384, 399] {
        bht.check_block(&(), block, &blocks[block as usize]).unwrap();
    }
    assert!(bht
        .check_block(&(), 256, &blocks[256])
        .unwrap_err()
        .is_integrity_failure());
}

/// Test: the default callback fails every read
#[test]
fn test_default_reader_fails() {
    let bht: Bht = Bht::create(10, "sha1").unwrap();
    assert_eq!(bht.populate(&(), 3).unwrap(), 1);
    assert_eq!(
        bht.check_block(&(), 3, &[0u8; 4096]),
        Err(BhtError::Io { level: 0, index: 0 })
    );
}

/// Test: a request dropped without completion fails its entry
#[test]
fn test_dropped_request_fails_entry() {
    let (bht, reader, _blocks) = queued_verifier(10, 4);
    bht.populate(&(), 0).unwrap();
    drop(reader.take());
    assert_eq!(bht.entry_state(0, 0), Some(EntryState::IoError));
    assert_eq!(bht.populate(&(), 1), Err(BhtError::Io { level: 0, index: 0 }));
}

/// Test: a closure as read callback, with a caller context
#[test]
fn test_closure_callback_with_context() {
    init_logger();
    let blocks = random_image(5, 5);
    let builder = build_tree(&blocks, HashAlgorithm::Sha256, None);
    let store = MemoryHashStore::from_region(builder.region());

    let mut bht: Bht<str> = Bht::from_config(&builder.config().unwrap()).unwrap();
    bht.set_read_callback(move |ctx: &str, mut request: ReadRequest| -> io::Result<()> {
        assert_eq!(ctx, "request-7");
        let region = store.snapshot();
        let start = request.start_sector() as usize * 512;
        let len = request.buffer().len();
        request.buffer_mut().copy_from_slice(&region[start..start + len]);
        request
            .complete(Ok(()))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    });

    bht.check_block("request-7", 4, &blocks[4]).unwrap();
    assert_eq!(bht.entry_state(0, 0), Some(EntryState::Verified));
}

/// Test: a late failed completion lands on the still pending entry
#[test]
fn test_late_failed_completion() {
    let (bht, reader, _blocks) = queued_verifier(10, 6);
    bht.populate(&(), 0).unwrap();
    let request = reader.take().pop().unwrap();

    // Still pending: no second request
    assert_eq!(bht.populate(&(), 9).unwrap(), 0);
    request
        .complete(Err(io::Error::new(io::ErrorKind::TimedOut, "slow disk")))
        .unwrap();
    assert_eq!(bht.entry_state(0, 0), Some(EntryState::IoError));
}
