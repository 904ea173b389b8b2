//! 校验测试

use verity_bht::{Bht, BhtError, EntryState, HashAlgorithm, MemoryHashStore, PAGE_SIZE};

use crate::common::sample_data::{random_image, shuffled_blocks, tampered};
use crate::common::test_helpers::{build_tree, init_logger, open_verifier, verifier_for};

/// Assert every entry on `block`'s path is verified
fn assert_path_verified(bht: &Bht, block: u64) {
    let geometry = bht.geometry();
    for level in 0..geometry.depth() {
        let index = geometry.entry_index(level, block);
        assert_eq!(
            bht.entry_state(level, index),
            Some(EntryState::Verified),
            "block {} level {}",
            block,
            level
        );
    }
}

/// Test: single-block tree, hashed once and compared to the root
#[test]
fn test_trivial_tree_verifies() {
    let blocks = random_image(1, 1);
    let (bht, store) = verifier_for(&blocks);

    assert_eq!(bht.populate(&(), 0).unwrap(), 1);
    assert!(bht.is_populated(0));
    bht.verify(0, &blocks[0]).unwrap();
    assert_path_verified(&bht, 0);
    assert_eq!(store.read_count(), 1);
}

/// Test: a full single entry is read once, then never again
#[test]
fn test_exact_fan_out_reads_once() {
    let blocks = random_image(128, 2);
    let (bht, store) = verifier_for(&blocks);

    bht.check_block(&(), 17, &blocks[17]).unwrap();
    assert_eq!(store.read_count(), 1);
    bht.check_block(&(), 17, &blocks[17]).unwrap();
    bht.check_block(&(), 127, &blocks[127]).unwrap();
    assert_eq!(store.read_count(), 1);
}

/// Test: two leaf entries under one apex
#[test]
fn test_fan_out_with_remainder() {
    let blocks = random_image(129, 3);
    let (bht, store) = verifier_for(&blocks);

    bht.check_block(&(), 0, &blocks[0]).unwrap();
    assert_eq!(bht.entry_state(0, 0), Some(EntryState::Verified));
    assert_eq!(bht.entry_state(1, 0), Some(EntryState::Verified));
    assert_eq!(bht.entry_state(1, 1), Some(EntryState::Unallocated));

    bht.check_block(&(), 128, &blocks[128]).unwrap();
    assert_eq!(bht.entry_state(1, 1), Some(EntryState::Verified));
    assert_eq!(store.read_count(), 3);
}

/// Test: a flipped byte in a leaf entry fails only the blocks under it
#[test]
fn test_mismatch_localisation() {
    let blocks = random_image(300, 4);
    let (bht, store) = verifier_for(&blocks);
    let geometry = bht.geometry().clone();

    // Block 200 lives in the second leaf entry
    let leaf = geometry.leaf_level();
    let index = geometry.entry_index(leaf, 200);
    assert_eq!(index, 1);
    let offset = geometry.byte_offset_of(leaf, index) as usize + geometry.node_range(leaf, 200).start;
    assert!(store.corrupt_byte(offset, 0x80));

    bht.populate(&(), 200).unwrap();
    assert!(bht.is_populated(200));
    assert_eq!(
        bht.verify(200, &blocks[200]),
        Err(BhtError::Mismatch { level: leaf, index })
    );
    assert_eq!(bht.entry_state(leaf, index), Some(EntryState::Mismatch));

    // Siblings under the same entry fail without new reads
    let reads = store.read_count();
    assert_eq!(
        bht.check_block(&(), 129, &blocks[129]),
        Err(BhtError::Mismatch { level: leaf, index })
    );
    assert_eq!(store.read_count(), reads);

    // Other leaf entries are unaffected
    for block in [0u64, 127, 256, 299] {
        bht.check_block(&(), block, &blocks[block as usize]).unwrap();
    }
}

/// Test: a tampered apex entry fails every block
#[test]
fn test_tampered_apex() {
    let blocks = random_image(300, 5);
    let (bht, store) = verifier_for(&blocks);
    assert!(store.corrupt_byte(PAGE_SIZE - 1, 0x01));

    assert_eq!(
        bht.check_block(&(), 10, &blocks[10]),
        Err(BhtError::Mismatch { level: 0, index: 0 })
    );
    assert_eq!(
        bht.check_block(&(), 290, &blocks[290]),
        Err(BhtError::Mismatch { level: 0, index: 0 })
    );
}

/// Test: identical contents, salt "" and salt "00" give different roots
#[test]
fn test_salt_effect() {
    init_logger();
    let blocks = vec![vec![0x5au8; PAGE_SIZE]];

    let unsalted = build_tree(&blocks, HashAlgorithm::Sha256, Some(""));
    let salted = build_tree(&blocks, HashAlgorithm::Sha256, Some("00"));
    assert_ne!(
        unsalted.root_hex_digest().unwrap(),
        salted.root_hex_digest().unwrap()
    );

    for (builder, other) in [(&unsalted, &salted), (&salted, &unsalted)] {
        let mut own = open_verifier(builder);
        own.set_read_callback(MemoryHashStore::from_region(builder.region()));
        own.check_block(&(), 0, &blocks[0]).unwrap();

        // Same salt and region, but anchored on the other tree's root
        let mut crossed = open_verifier(builder);
        crossed.set_root_hex_digest(&other.root_hex_digest().unwrap()).unwrap();
        crossed.set_read_callback(MemoryHashStore::from_region(builder.region()));
        assert_eq!(
            crossed.check_block(&(), 0, &blocks[0]),
            Err(BhtError::Mismatch { level: 0, index: 0 })
        );
    }
}

/// Test: a verified block verifies again without any read
#[test]
fn test_reverify_issues_no_reads() {
    let blocks = random_image(1000, 6);
    let (bht, store) = verifier_for(&blocks);

    for block in shuffled_blocks(1000, 7).into_iter().take(50) {
        bht.check_block(&(), block, &blocks[block as usize]).unwrap();
        assert_path_verified(&bht, block);

        let reads = store.read_count();
        assert_eq!(bht.populate(&(), block).unwrap(), 0);
        bht.verify(block, &blocks[block as usize]).unwrap();
        assert_eq!(store.read_count(), reads);
    }
}

/// Test: every block in random order, then a tampered copy of each
#[test]
fn test_whole_image_random_order() {
    let blocks = random_image(2000, 8);
    let (bht, store) = verifier_for(&blocks);

    for block in shuffled_blocks(2000, 9) {
        bht.check_block(&(), block, &blocks[block as usize]).unwrap();
    }
    // Each entry read exactly once
    assert_eq!(store.read_count(), bht.geometry().total_entries());

    let leaf = bht.geometry().leaf_level();
    let tampered_blocks: Vec<u64> = shuffled_blocks(2000, 10).into_iter().take(100).collect();
    for &block in &tampered_blocks {
        let bad = tampered(&blocks[block as usize], block as usize * 31);
        assert_eq!(
            bht.verify(block, &bad),
            Err(BhtError::Mismatch {
                level: leaf,
                index: bht.geometry().entry_index(leaf, block)
            })
        );
    }

    // Bad data poisons the leaf entry, verified or not
    for &block in &tampered_blocks {
        let index = bht.geometry().entry_index(leaf, block);
        assert_eq!(bht.entry_state(leaf, index), Some(EntryState::Mismatch));
        assert_eq!(
            bht.verify(block, &blocks[block as usize]),
            Err(BhtError::Mismatch { level: leaf, index })
        );
    }
}

/// Test: every supported algorithm, salted, two levels deep
#[test]
fn test_all_algorithms() {
    init_logger();
    for algorithm in HashAlgorithm::ALL {
        let fan_out = 1u64 << (usize::BITS - 1 - (PAGE_SIZE / algorithm.digest_size()).leading_zeros());
        let block_count = 2 * fan_out + 3;
        let blocks = random_image(block_count, 11);

        let builder = build_tree(&blocks, algorithm, Some("deadbeef"));
        let mut bht = open_verifier(&builder);
        assert_eq!(bht.depth(), 2, "{}", algorithm);
        assert_eq!(bht.fan_out(), fan_out);
        bht.set_read_callback(MemoryHashStore::from_region(builder.region()));

        for block in [0, fan_out, block_count - 1] {
            bht.check_block(&(), block, &blocks[block as usize]).unwrap();
        }
        assert!(bht
            .verify(1, &tampered(&blocks[1], 0))
            .unwrap_err()
            .is_integrity_failure());
    }
}
