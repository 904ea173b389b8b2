//! 配置测试

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use verity_bht::{Bht, BhtConfig, HashAlgorithm, MemoryHashStore, TreeBuilder};

use crate::common::sample_data::{image_bytes, random_image};
use crate::common::test_helpers::init_logger;

/// Test: builder table arguments open a working verifier
#[test]
fn test_table_args_open_verifier() {
    init_logger();
    let blocks = random_image(500, 31);
    let mut builder = TreeBuilder::create(500, "sha512").unwrap();
    builder.set_salt_hex("0123456789abcdef").unwrap();
    builder
        .store_from_reader(&mut image_bytes(&blocks).as_slice())
        .unwrap();
    builder.compute().unwrap();

    let line = format!(
        "payload=/dev/loop0 hashtree=/dev/loop0 {} error_behavior=eio",
        builder.table_args().unwrap()
    );
    let config = BhtConfig::from_table_args(&line).unwrap();
    assert_eq!(config, builder.config().unwrap());

    let mut bht: Bht = Bht::from_config(&config).unwrap();
    bht.set_read_callback(MemoryHashStore::from_region(builder.region()));
    for block in [0u64, 63, 64, 499] {
        bht.check_block(&(), block, &blocks[block as usize]).unwrap();
    }
    assert_eq!(bht.config(), config);
}

/// Test: root digest hex survives a write/set round trip
#[test]
fn test_root_hex_round_trip() {
    let mut rng = StdRng::seed_from_u64(32);
    for algorithm in HashAlgorithm::ALL {
        let mut bht: Bht = Bht::with_algorithm(1, algorithm).unwrap();
        for _ in 0..16 {
            let mut digest = vec![0u8; algorithm.digest_size()];
            rng.fill_bytes(&mut digest);
            bht.set_root_digest(&digest).unwrap();

            let mut buf = [0u8; 2 * 64 + 1];
            let len = bht.write_root_hex_digest(&mut buf).unwrap();
            let hex = std::str::from_utf8(&buf[..len]).unwrap().to_string();

            bht.set_root_digest(&vec![0u8; algorithm.digest_size()]).unwrap();
            bht.set_root_hex_digest(&hex).unwrap();
            assert_eq!(bht.root_digest(), &digest[..]);
        }
    }
}
