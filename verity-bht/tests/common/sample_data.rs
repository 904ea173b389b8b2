//! 测试数据生成
//!
//! 固定随机种子，失败可复现

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};

use verity_bht::PAGE_SIZE;

/// `block_count` pages of random contents
pub fn random_image(block_count: u64, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..block_count)
        .map(|_| {
            let mut block = vec![0u8; PAGE_SIZE];
            rng.fill_bytes(&mut block);
            block
        })
        .collect()
}

/// The blocks of an image in a random order
pub fn shuffled_blocks(block_count: u64, seed: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<u64> = (0..block_count).collect();
    order.shuffle(&mut rng);
    order
}

/// Flatten an image into one byte stream, as read from a device
pub fn image_bytes(blocks: &[Vec<u8>]) -> Vec<u8> {
    blocks.concat()
}

/// A copy of `block` with one bit flipped at `offset`
pub fn tampered(block: &[u8], offset: usize) -> Vec<u8> {
    let mut out = block.to_vec();
    out[offset % PAGE_SIZE] ^= 0x01;
    out
}
