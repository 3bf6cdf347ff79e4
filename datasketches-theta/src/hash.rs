// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! MurmurHash3 (x64, 128-bit) and seed fingerprints.

use std::hash::Hasher;

use crate::codec::read_u64_le;

/// The seed used by default when hashing sketch input.
pub const DEFAULT_UPDATE_SEED: u64 = 9001;

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

/// Computes the 16-bit fingerprint of a hash seed.
///
/// Two sketches can only be combined when their fingerprints are equal.
///
/// # Examples
///
/// ```
/// # use datasketches_theta::hash::DEFAULT_UPDATE_SEED;
/// # use datasketches_theta::hash::compute_seed_hash;
/// assert_eq!(
///     compute_seed_hash(DEFAULT_UPDATE_SEED),
///     compute_seed_hash(DEFAULT_UPDATE_SEED)
/// );
/// ```
pub fn compute_seed_hash(seed: u64) -> u16 {
    let (h1, _) = murmur3_x64_128(&seed.to_le_bytes(), 0);
    (h1 & 0xFFFF) as u16
}

/// Streaming adapter that feeds [`std::hash::Hash`] values into MurmurHash3.
///
/// Bytes are buffered and hashed once in [`Hasher::finish`], which returns the first
/// 64-bit half of the 128-bit digest.
#[derive(Debug, Clone)]
pub(crate) struct MurmurHash3X64128 {
    seed: u64,
    buf: Vec<u8>,
}

impl MurmurHash3X64128 {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, buf: vec![] }
    }
}

impl Hasher for MurmurHash3X64128 {
    fn finish(&self) -> u64 {
        murmur3_x64_128(&self.buf, self.seed).0
    }

    fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

pub(crate) fn murmur3_x64_128(data: &[u8], seed: u64) -> (u64, u64) {
    let mut h1 = seed;
    let mut h2 = seed;

    let num_blocks = data.len() / 16;
    for block in 0..num_blocks {
        let k1 = read_u64_le(data, block * 16);
        let k2 = read_u64_le(data, block * 16 + 8);

        h1 ^= mix_k1(k1);
        h1 = h1
            .rotate_left(27)
            .wrapping_add(h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dc_e729);

        h2 ^= mix_k2(k2);
        h2 = h2
            .rotate_left(31)
            .wrapping_add(h1)
            .wrapping_mul(5)
            .wrapping_add(0x3849_5ab5);
    }

    let tail = &data[num_blocks * 16..];
    let mut k1 = 0u64;
    let mut k2 = 0u64;
    for (i, &byte) in tail.iter().enumerate() {
        if i < 8 {
            k1 |= (byte as u64) << (8 * i);
        } else {
            k2 |= (byte as u64) << (8 * (i - 8));
        }
    }
    if tail.len() > 8 {
        h2 ^= mix_k2(k2);
    }
    if !tail.is_empty() {
        h1 ^= mix_k1(k1);
    }

    let len = data.len() as u64;
    h1 ^= len;
    h2 ^= len;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    (h1, h2)
}

#[inline]
fn mix_k1(k1: u64) -> u64 {
    k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2)
}

#[inline]
fn mix_k2(k2: u64) -> u64 {
    k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1)
}

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}
