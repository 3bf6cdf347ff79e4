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

//! Immutable compact theta sketches.
//!
//! [`CompactThetaSketch`] owns its hashes. [`WrappedCompactThetaSketch`] reads them in place
//! from a serialized image.

use crate::codec::MemoryViewMut;
use crate::codec::family::Family;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::decode::SketchImage;
use crate::theta::decode::decode_sketch;
use crate::theta::hash_table::MAX_THETA;
use crate::theta::serialization::*;
use crate::theta::view::ThetaSketchView;

/// Immutable theta sketch holding only its retained hashes.
///
/// Produced by [`ThetaSketch::compact`](crate::theta::ThetaSketch::compact) and by
/// [`ThetaUnion::result`](crate::theta::ThetaUnion::result).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactThetaSketch {
    entries: Vec<u64>,
    theta: u64,
    seed_hash: u16,
    is_empty: bool,
    is_ordered: bool,
}

impl CompactThetaSketch {
    pub(crate) fn from_parts(
        entries: Vec<u64>,
        theta: u64,
        seed_hash: u16,
        is_empty: bool,
        is_ordered: bool,
    ) -> Self {
        Self {
            entries,
            theta,
            seed_hash,
            is_empty,
            is_ordered,
        }
    }

    /// Return cardinality estimate
    pub fn estimate(&self) -> f64 {
        estimate(self.is_empty, self.entries.len(), self.theta)
    }

    /// Return theta as a fraction (0.0 to 1.0)
    pub fn theta(&self) -> f64 {
        self.theta as f64 / MAX_THETA as f64
    }

    /// Return theta as u64
    pub fn theta64(&self) -> u64 {
        self.theta
    }

    /// Check if sketch is empty
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// Check if the hashes are sorted in ascending order
    pub fn is_ordered(&self) -> bool {
        self.is_ordered
    }

    /// Check if sketch is in estimation mode
    pub fn is_estimation_mode(&self) -> bool {
        self.theta < MAX_THETA
    }

    /// Return number of retained entries
    pub fn num_retained(&self) -> usize {
        self.entries.len()
    }

    /// Return the 16-bit fingerprint of the seed
    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    /// Return iterator over hash values
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().copied()
    }

    /// Theta is written whenever it is below 1.0, empty or not.
    fn preamble_longs(&self) -> u8 {
        if self.is_estimation_mode() {
            PREAMBLE_LONGS_ESTIMATION
        } else if self.is_empty {
            PREAMBLE_LONGS_EMPTY
        } else if self.entries.is_empty() {
            PREAMBLE_LONGS_ESTIMATION
        } else {
            PREAMBLE_LONGS_EXACT
        }
    }

    /// Returns the number of bytes [`serialize`](Self::serialize) produces.
    pub fn serialized_size(&self) -> usize {
        let preamble_longs = self.preamble_longs();
        let num_entries = if self.is_empty { 0 } else { self.entries.len() };
        (preamble_longs as usize + num_entries) * HASH_SIZE_BYTES
    }

    /// Serializes the sketch in the current format (serial version 3).
    ///
    /// # Examples
    ///
    /// ```
    /// # use datasketches_theta::theta::CompactThetaSketch;
    /// # use datasketches_theta::theta::ThetaSketch;
    /// let mut sketch = ThetaSketch::builder().build();
    /// sketch.update("apple");
    /// let compact = sketch.compact(true);
    /// let restored = CompactThetaSketch::deserialize(&compact.serialize()).unwrap();
    /// assert_eq!(compact, restored);
    /// ```
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.serialized_size()];
        self.write_v3(&mut MemoryViewMut::new(&mut bytes));
        bytes
    }

    /// Serializes the sketch into the front of `dst` and wraps the written bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityExceeded`](crate::error::ErrorKind::CapacityExceeded) if `dst` is
    /// shorter than [`serialized_size`](Self::serialized_size).
    pub fn serialize_into<'b>(
        &self,
        dst: &'b mut [u8],
    ) -> Result<WrappedCompactThetaSketch<'b>, Error> {
        let size = self.serialized_size();
        if dst.len() < size {
            return Err(Error::capacity_exceeded(size, dst.len()));
        }
        let dst = &mut dst[..size];
        self.write_v3(&mut MemoryViewMut::new(dst));
        let dst: &'b [u8] = dst;
        WrappedCompactThetaSketch::from_bytes(dst, self.seed_hash)
    }

    fn write_v3(&self, mem: &mut MemoryViewMut<'_>) {
        let preamble_longs = self.preamble_longs();
        let mut flags = FLAG_IS_COMPACT | FLAG_IS_READ_ONLY;
        if self.is_ordered {
            flags |= FLAG_IS_ORDERED;
        }
        if self.is_empty {
            flags |= FLAG_IS_EMPTY;
        }
        mem.put_u8(PREAMBLE_LONGS_BYTE, preamble_longs);
        mem.put_u8(SER_VER_BYTE, SERIAL_VERSION);
        mem.put_u8(FAMILY_BYTE, Family::COMPACT.id);
        mem.put_u8(FLAGS_BYTE, flags);
        mem.put_u16(SEED_HASH_SHORT, self.seed_hash);
        if preamble_longs == PREAMBLE_LONGS_EMPTY {
            return;
        }
        mem.put_u32(RETAINED_ENTRIES_INT, self.entries.len() as u32);
        mem.put_f32(P_FLOAT, 1.0);
        if preamble_longs == PREAMBLE_LONGS_ESTIMATION {
            mem.put_u64(THETA_LONG, self.theta);
        }
        for (index, &hash) in self.entries.iter().enumerate() {
            mem.put_hash(preamble_longs, index, hash);
        }
    }

    /// Serializes the sketch in serial version 2.
    ///
    /// Hashes are always written in ascending order.
    pub fn serialize_v2(&self) -> Vec<u8> {
        let preamble_longs = self.preamble_longs();
        let num_entries = if self.is_empty { 0 } else { self.entries.len() };
        let mut bytes = vec![0u8; (preamble_longs as usize + num_entries) * HASH_SIZE_BYTES];
        let mut mem = MemoryViewMut::new(&mut bytes);
        let mut flags = FLAG_IS_COMPACT | FLAG_IS_READ_ONLY | FLAG_IS_ORDERED;
        if self.is_empty {
            flags |= FLAG_IS_EMPTY;
        }
        mem.put_u8(PREAMBLE_LONGS_BYTE, preamble_longs);
        mem.put_u8(SER_VER_BYTE, SERIAL_VERSION_2);
        mem.put_u8(FAMILY_BYTE, Family::SET_SKETCH.id);
        mem.put_u8(FLAGS_BYTE, flags);
        mem.put_u16(SEED_HASH_SHORT, self.seed_hash);
        if preamble_longs == PREAMBLE_LONGS_EMPTY {
            return bytes;
        }
        mem.put_u32(RETAINED_ENTRIES_INT, num_entries as u32);
        mem.put_f32(P_FLOAT, 1.0);
        if preamble_longs == PREAMBLE_LONGS_ESTIMATION {
            mem.put_u64(THETA_LONG, self.theta);
        }
        for (index, hash) in self.sorted_entries().into_iter().enumerate() {
            mem.put_hash(preamble_longs, index, hash);
        }
        bytes
    }

    /// Serializes the sketch in serial version 1.
    ///
    /// Version 1 carries no seed hash and no empty flag: an image without entries is
    /// written as the 24-byte empty image, and hashes are always in ascending order.
    pub fn serialize_v1(&self) -> Vec<u8> {
        let num_entries = if self.is_empty { 0 } else { self.entries.len() };
        let mut bytes = vec![0u8; (PREAMBLE_LONGS_V1 as usize + num_entries) * HASH_SIZE_BYTES];
        let mut mem = MemoryViewMut::new(&mut bytes);
        mem.put_u8(PREAMBLE_LONGS_BYTE, PREAMBLE_LONGS_V1);
        mem.put_u8(SER_VER_BYTE, SERIAL_VERSION_1);
        mem.put_u8(FAMILY_BYTE, Family::SET_SKETCH.id);
        mem.put_u32(RETAINED_ENTRIES_INT, num_entries as u32);
        mem.put_u64(
            THETA_LONG,
            if num_entries == 0 { MAX_THETA } else { self.theta },
        );
        if num_entries > 0 {
            for (index, hash) in self.sorted_entries().into_iter().enumerate() {
                mem.put_hash(PREAMBLE_LONGS_V1, index, hash);
            }
        }
        bytes
    }

    fn sorted_entries(&self) -> Vec<u64> {
        let mut entries = self.entries.clone();
        if !self.is_ordered {
            entries.sort_unstable();
        }
        entries
    }

    /// Deserializes a compact sketch of serial version 1, 2 or 3 built with the default seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are truncated, are not a compact sketch, or were built
    /// with a different seed.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Deserializes a compact sketch of serial version 1, 2 or 3 built with `seed`.
    pub fn deserialize_with_seed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        Ok(WrappedCompactThetaSketch::wrap_with_seed(bytes, seed)?.to_heap())
    }
}

impl ThetaSketchView for CompactThetaSketch {
    fn theta64(&self) -> u64 {
        self.theta
    }

    fn num_retained(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.is_empty
    }

    fn is_ordered(&self) -> bool {
        self.is_ordered
    }

    fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    fn cache(&self) -> impl Iterator<Item = u64> + '_ {
        self.iter()
    }
}

/// Compact theta sketch read in place from serialized bytes.
#[derive(Debug, Clone, Copy)]
pub struct WrappedCompactThetaSketch<'a> {
    bytes: &'a [u8],
    image: Option<SketchImage<'a>>,
    seed_hash: u16,
}

impl<'a> WrappedCompactThetaSketch<'a> {
    /// Wraps a compact sketch of serial version 1, 2 or 3 built with the default seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are truncated, are not a compact sketch, or were built
    /// with a different seed.
    pub fn wrap(bytes: &'a [u8]) -> Result<Self, Error> {
        Self::wrap_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Wraps a compact sketch of serial version 1, 2 or 3 built with `seed`.
    pub fn wrap_with_seed(bytes: &'a [u8], seed: u64) -> Result<Self, Error> {
        Self::from_bytes(bytes, compute_seed_hash(seed))
    }

    pub(crate) fn from_bytes(bytes: &'a [u8], seed_hash: u16) -> Result<Self, Error> {
        let image = decode_sketch(bytes, seed_hash)?;
        if let Some(&family_id) = bytes.get(FAMILY_BYTE) {
            Family::COMPACT.validate_id(family_id)?;
        }
        if image.is_some_and(|image| !image.is_compact) {
            return Err(Error::deserial("compact flag is not set"));
        }
        Ok(Self {
            bytes,
            image,
            seed_hash,
        })
    }

    /// Return the wrapped bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Return cardinality estimate
    pub fn estimate(&self) -> f64 {
        estimate(self.is_empty(), self.num_retained(), self.theta64())
    }

    /// Return theta as a fraction (0.0 to 1.0)
    pub fn theta(&self) -> f64 {
        self.theta64() as f64 / MAX_THETA as f64
    }

    /// Return theta as u64
    pub fn theta64(&self) -> u64 {
        self.image.map_or(MAX_THETA, |image| image.theta)
    }

    /// Check if sketch is empty
    pub fn is_empty(&self) -> bool {
        self.image.is_none_or(|image| image.is_empty)
    }

    /// Check if the hashes are sorted in ascending order
    pub fn is_ordered(&self) -> bool {
        self.image.is_none_or(|image| image.is_ordered)
    }

    /// Return number of retained entries
    pub fn num_retained(&self) -> usize {
        self.image.map_or(0, |image| image.num_retained)
    }

    /// Return the 16-bit fingerprint of the seed
    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    /// Return iterator over hash values
    pub fn iter(&self) -> impl Iterator<Item = u64> + 'a {
        self.image.into_iter().flat_map(|image| image.hashes())
    }

    /// Copies the sketch onto the heap.
    pub fn to_heap(&self) -> CompactThetaSketch {
        CompactThetaSketch::from_parts(
            self.iter().collect(),
            self.theta64(),
            self.seed_hash,
            self.is_empty(),
            self.is_ordered(),
        )
    }
}

impl ThetaSketchView for WrappedCompactThetaSketch<'_> {
    fn theta64(&self) -> u64 {
        WrappedCompactThetaSketch::theta64(self)
    }

    fn num_retained(&self) -> usize {
        WrappedCompactThetaSketch::num_retained(self)
    }

    fn is_empty(&self) -> bool {
        WrappedCompactThetaSketch::is_empty(self)
    }

    fn is_ordered(&self) -> bool {
        WrappedCompactThetaSketch::is_ordered(self)
    }

    fn is_direct(&self) -> bool {
        true
    }

    fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    fn cache(&self) -> impl Iterator<Item = u64> + '_ {
        self.iter()
    }
}

fn estimate(is_empty: bool, num_retained: usize, theta: u64) -> f64 {
    if is_empty {
        return 0.0;
    }
    num_retained as f64 / (theta as f64 / MAX_THETA as f64)
}
