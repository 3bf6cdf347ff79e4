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

//! Theta union.
//!
//! A union accumulates hashes from any number of theta sketches into an internal hash
//! table (the gadget) and tracks its own theta: the smallest theta of every input and of
//! the gadget. Inputs may be update sketches, compact sketches (on the heap or wrapped in
//! place) or serialized images of serial version 1, 2 or 3.
//!
//! A union lives either on the heap or inside a caller-supplied buffer. A buffer-backed
//! union keeps its whole state, including the union theta at byte 24, current in the buffer
//! after every mutation, so the buffer can be wrapped again later.

use std::hash::Hash;

use tracing::debug;
use tracing::trace;

use crate::ResizeFactor;
use crate::codec::MemoryView;
use crate::codec::MemoryViewMut;
use crate::codec::assert::ensure_preamble_longs_in;
use crate::codec::assert::ensure_seed_hash_matches;
use crate::codec::assert::ensure_serial_version_is;
use crate::codec::family::Family;
use crate::codec::image_len;
use crate::common::canonical_double;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::CompactThetaSketch;
use crate::theta::WrappedCompactThetaSketch;
use crate::theta::decode::decode_sketch;
use crate::theta::hash_table::DEFAULT_LG_K;
use crate::theta::hash_table::MAX_LG_K;
use crate::theta::hash_table::MIN_LG_ARR;
use crate::theta::hash_table::MIN_LG_K;
use crate::theta::hash_table::TableHeader;
use crate::theta::hash_table::ThetaHashTable;
use crate::theta::quick_select::select_excluding_zeros;
use crate::theta::serialization::*;
use crate::theta::view::ThetaSketchView;

/// Returns the number of bytes a buffer-backed union of nominal size `2^lg_k` needs.
///
/// # Examples
///
/// ```
/// # use datasketches_theta::theta::max_union_bytes;
/// assert_eq!(max_union_bytes(5), 32 + 64 * 8);
/// ```
pub fn max_union_bytes(lg_k: u8) -> usize {
    (PREAMBLE_LONGS_UNION as usize + (2usize << lg_k)) * HASH_SIZE_BYTES
}

/// Union of theta sketches.
///
/// # Examples
///
/// ```
/// # use datasketches_theta::theta::ThetaSketch;
/// # use datasketches_theta::theta::ThetaUnion;
/// let mut a = ThetaSketch::builder().build();
/// let mut b = ThetaSketch::builder().build();
/// for i in 0..100 {
///     a.update(i);
///     b.update(i + 50);
/// }
///
/// let mut union = ThetaUnion::builder().build().unwrap();
/// union.merge(Some(&a)).unwrap();
/// union.merge(Some(&b.compact(true))).unwrap();
/// assert_eq!(union.result(true).estimate(), 150.0);
/// ```
#[derive(Debug)]
pub struct ThetaUnion<'a> {
    gadget: ThetaHashTable<'a>,
    union_theta: u64,
}

impl ThetaUnion<'static> {
    /// Create a new builder for ThetaUnion
    pub fn builder() -> ThetaUnionBuilder {
        ThetaUnionBuilder::default()
    }

    /// Restores a union onto the heap from the bytes of
    /// [`serialize_updatable`](ThetaUnion::serialize_updatable) or of a buffer-backed union.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid union image, or if the union was built
    /// with a different seed.
    pub fn heapify(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let mem = MemoryView::new(bytes);
        validate_union_image(mem, compute_seed_hash(seed))?;
        Ok(Self {
            gadget: ThetaHashTable::from_image(mem, PREAMBLE_LONGS_UNION, seed),
            union_theta: mem.u64_at(UNION_THETA_LONG),
        })
    }
}

impl<'a> ThetaUnion<'a> {
    /// Wraps a buffer holding a union image, checking it thoroughly.
    ///
    /// A hash table smaller than its full size is grown in place, so `mem` must span
    /// [`max_union_bytes`] for the image's nominal size.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid union image, if the union was built
    /// with a different seed, or if `mem` is too small.
    pub fn writable_wrap(mem: &'a mut [u8], seed: u64) -> Result<Self, Error> {
        let header = validate_union_image(MemoryView::new(mem), compute_seed_hash(seed))?;
        Self::wrap_checked(mem, header, seed)
    }

    /// Wraps a buffer holding a union image with minimal checks.
    ///
    /// Only the family, the table sizes and the buffer length are checked. The seed,
    /// serial version and retained count are trusted: a corrupted image yields wrong
    /// estimates, never an out-of-bounds access.
    pub fn fast_wrap(mem: &'a mut [u8], seed: u64) -> Result<Self, Error> {
        let header = check_union_layout(MemoryView::new(mem))?;
        Self::wrap_checked(mem, header, seed)
    }

    fn wrap_checked(mem: &'a mut [u8], header: TableHeader, seed: u64) -> Result<Self, Error> {
        let required = max_union_bytes(header.lg_nom_size);
        if mem.len() < required {
            return Err(Error::capacity_exceeded(required, mem.len()));
        }
        let union_theta = MemoryView::new(mem).u64_at(UNION_THETA_LONG);
        Ok(Self {
            gadget: ThetaHashTable::wrap_memory(mem, seed),
            union_theta,
        })
    }

    /// Merges a sketch into the union.
    ///
    /// `None` stands for an absent sketch and leaves the union unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SeedMismatch`](crate::error::ErrorKind::SeedMismatch) if the sketch was
    /// built with a different seed. The union is unchanged in that case.
    pub fn merge<S: ThetaSketchView>(&mut self, sketch: Option<&S>) -> Result<(), Error> {
        let Some(sketch) = sketch else {
            return Ok(());
        };
        ensure_seed_hash_matches(self.seed_hash(), sketch.seed_hash())?;
        self.union_theta = self.union_theta.min(sketch.theta64());
        let num_retained = sketch.num_retained();
        if sketch.is_ordered() {
            self.merge_ordered(sketch.cache().take(num_retained));
        } else {
            self.merge_unordered(sketch.cache(), num_retained);
        }
        self.tighten_and_persist();
        Ok(())
    }

    /// Merges a serialized sketch of serial version 1, 2 or 3.
    ///
    /// Version 3 accepts compact sketches and the hash-table images of update sketches.
    /// Versions 1 and 2 accept the legacy compact set sketch. An empty slice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the serial version or family is not accepted, if the seed does
    /// not match, or if the bytes are truncated or inconsistent. Every check runs before
    /// the union is touched, so the union is unchanged on error.
    pub fn merge_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let Some(image) = decode_sketch(bytes, self.seed_hash())? else {
            trace!(len = bytes.len(), "skipped empty serialized sketch");
            return Ok(());
        };
        self.union_theta = self.union_theta.min(image.theta);
        if image.is_ordered {
            self.merge_ordered(image.hashes());
        } else {
            self.merge_unordered(image.hashes(), usize::MAX);
        }
        self.tighten_and_persist();
        Ok(())
    }

    /// Inserts ascending hashes until one reaches the union theta.
    fn merge_ordered(&mut self, hashes: impl Iterator<Item = u64>) {
        for hash in hashes {
            if hash >= self.union_theta {
                break;
            }
            self.gadget.try_insert(hash);
        }
    }

    /// Inserts valid hashes below the union theta, at most `limit` of them.
    fn merge_unordered(&mut self, hashes: impl Iterator<Item = u64>, limit: usize) {
        let mut accepted = 0;
        for hash in hashes {
            if accepted == limit {
                break;
            }
            // Also rejects dirty slots, which are above MAX_THETA.
            if hash == 0 || hash >= self.union_theta {
                continue;
            }
            self.gadget.try_insert(hash);
            accepted += 1;
        }
    }

    fn tighten_and_persist(&mut self) {
        let gadget_theta = self.gadget.theta();
        if gadget_theta < self.union_theta {
            debug!(
                from = self.union_theta,
                to = gadget_theta,
                "union theta lowered by gadget rebuild"
            );
            self.union_theta = gadget_theta;
        }
        self.persist_union_theta();
    }

    fn persist_union_theta(&mut self) {
        let union_theta = self.union_theta;
        if let Some(mem) = self.gadget.memory_mut() {
            mem.put_u64(UNION_THETA_LONG, union_theta);
        }
    }

    /// Update the union with a hashable value
    pub fn update<T: Hash>(&mut self, value: T) {
        let hash = self.gadget.hash_and_screen(value);
        if hash != 0 {
            self.gadget.try_insert(hash);
        }
    }

    /// Update the union with a f64 value
    pub fn update_f64(&mut self, value: f64) {
        self.update(canonical_double(value));
    }

    /// Update the union with a f32 value
    pub fn update_f32(&mut self, value: f32) {
        self.update_f64(value as f64);
    }

    /// Returns the union of everything merged so far as a compact sketch.
    ///
    /// The result keeps at most `k` hashes. Its theta is the smallest of the union theta,
    /// the gadget theta and, when the gadget holds more than `k` hashes, the (k+1)-th
    /// smallest hash. The union itself is not modified.
    pub fn result(&self, ordered: bool) -> CompactThetaSketch {
        self.snapshot().into_compact(ordered)
    }

    /// Like [`result`](Self::result), but serializes the result into the front of `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityExceeded`](crate::error::ErrorKind::CapacityExceeded) if `dst` is
    /// too small for the result.
    pub fn result_into<'b>(
        &self,
        ordered: bool,
        dst: &'b mut [u8],
    ) -> Result<WrappedCompactThetaSketch<'b>, Error> {
        self.result(ordered).serialize_into(dst)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            slots: self.gadget.raw_slots().collect(),
            header: self.gadget.header(),
            union_theta: self.union_theta,
            seed_hash: self.seed_hash(),
        }
    }

    /// Return cardinality estimate of the result
    pub fn estimate(&self) -> f64 {
        self.result(false).estimate()
    }

    /// Return theta of the result as u64
    pub fn theta64(&self) -> u64 {
        self.result(false).theta64()
    }

    /// Return the union theta: the smallest theta seen in any input or in the gadget
    pub fn union_theta64(&self) -> u64 {
        self.union_theta
    }

    /// Return number of hashes held by the gadget, which may exceed `k`
    pub fn num_retained(&self) -> usize {
        self.gadget.num_entries()
    }

    /// Check if the union has seen no input
    pub fn is_empty(&self) -> bool {
        self.gadget.is_empty()
    }

    /// Return lg_k
    pub fn lg_k(&self) -> u8 {
        self.gadget.lg_nom_size()
    }

    /// Return the 16-bit fingerprint of the seed
    pub fn seed_hash(&self) -> u16 {
        self.gadget.seed_hash()
    }

    /// Check if the union lives in a caller-supplied buffer
    pub fn is_direct(&self) -> bool {
        self.gadget.is_direct()
    }

    /// Returns true if the union lives in the buffer at `memory`, comparing both address
    /// and length.
    ///
    /// A heap union never shares a resource.
    ///
    /// `memory` is a raw pointer because a buffer-backed union holds the mutable borrow of
    /// its buffer, so no `&[u8]` to that buffer can exist while the union is alive. Take
    /// the pointer before building the union. It is only compared, never dereferenced.
    ///
    /// # Examples
    ///
    /// ```
    /// # use datasketches_theta::theta::ThetaUnion;
    /// # use datasketches_theta::theta::max_union_bytes;
    /// let mut buf = vec![0u8; max_union_bytes(5)];
    /// let ptr = buf.as_slice() as *const [u8];
    /// let union = ThetaUnion::builder().lg_k(5).build_in(&mut buf).unwrap();
    /// assert!(union.is_same_resource(ptr));
    /// ```
    pub fn is_same_resource(&self, memory: *const [u8]) -> bool {
        self.gadget
            .memory()
            .is_some_and(|mem| std::ptr::eq(mem.as_slice(), memory))
    }

    /// Reset the union to its freshly constructed state
    pub fn reset(&mut self) {
        self.gadget.reset();
        self.union_theta = self.gadget.theta();
        self.persist_union_theta();
    }

    /// Serializes the whole union state, gadget hash table included.
    ///
    /// The bytes can be restored with [`heapify`](ThetaUnion::heapify) or wrapped with
    /// [`writable_wrap`](Self::writable_wrap) once copied into a buffer of
    /// [`max_union_bytes`].
    pub fn serialize_updatable(&self) -> Vec<u8> {
        let len = (PREAMBLE_LONGS_UNION as usize + self.gadget.num_slots()) * HASH_SIZE_BYTES;
        let mut bytes = vec![0u8; len];
        let mut mem = MemoryViewMut::new(&mut bytes);
        self.gadget
            .write_image(&mut mem, PREAMBLE_LONGS_UNION, Family::UNION);
        mem.put_u64(UNION_THETA_LONG, self.union_theta);
        bytes
    }
}

/// Read-only view of a union image.
///
/// The view never writes to the bytes and is the way to read a union whose buffer is
/// shared.
#[derive(Debug, Clone, Copy)]
pub struct ThetaUnionView<'a> {
    mem: MemoryView<'a>,
    header: TableHeader,
    union_theta: u64,
    seed_hash: u16,
}

impl<'a> ThetaUnionView<'a> {
    /// Wraps a union image, checking it thoroughly.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid union image, or if the union was built
    /// with a different seed.
    pub fn wrap(bytes: &'a [u8], seed: u64) -> Result<Self, Error> {
        let mem = MemoryView::new(bytes);
        let header = validate_union_image(mem, compute_seed_hash(seed))?;
        Ok(Self::from_checked(mem, header))
    }

    /// Wraps a union image checking only its family, table sizes and length.
    pub fn fast_wrap(bytes: &'a [u8]) -> Result<Self, Error> {
        let mem = MemoryView::new(bytes);
        let header = check_union_layout(mem)?;
        Ok(Self::from_checked(mem, header))
    }

    fn from_checked(mem: MemoryView<'a>, header: TableHeader) -> Self {
        Self {
            mem,
            header,
            union_theta: mem.u64_at(UNION_THETA_LONG),
            seed_hash: mem.u16_at(SEED_HASH_SHORT),
        }
    }

    /// Returns the union as a compact sketch, see [`ThetaUnion::result`].
    pub fn result(&self, ordered: bool) -> CompactThetaSketch {
        let slots = (0..1usize << self.header.lg_cur_size)
            .map(|index| self.mem.hash_at(PREAMBLE_LONGS_UNION, index))
            .collect();
        let snapshot = Snapshot {
            slots,
            header: self.header,
            union_theta: self.union_theta,
            seed_hash: self.seed_hash,
        };
        snapshot.into_compact(ordered)
    }

    /// Return cardinality estimate of the result
    pub fn estimate(&self) -> f64 {
        self.result(false).estimate()
    }

    /// Return theta of the result as u64
    pub fn theta64(&self) -> u64 {
        self.result(false).theta64()
    }

    /// Return the union theta stored in the image
    pub fn union_theta64(&self) -> u64 {
        self.union_theta
    }

    /// Return number of hashes held by the gadget
    pub fn num_retained(&self) -> usize {
        self.header.num_entries
    }

    /// Check if the union has seen no input
    pub fn is_empty(&self) -> bool {
        self.header.is_empty
    }

    /// Return lg_k
    pub fn lg_k(&self) -> u8 {
        self.header.lg_nom_size
    }

    /// Return the 16-bit fingerprint of the seed
    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    /// Returns true if the view reads exactly `memory`, comparing address and length.
    pub fn is_same_resource(&self, memory: &[u8]) -> bool {
        std::ptr::eq(self.mem.as_slice(), memory)
    }
}

/// Private copy of the gadget state that a result is computed from.
struct Snapshot {
    slots: Vec<u64>,
    header: TableHeader,
    union_theta: u64,
    seed_hash: u16,
}

impl Snapshot {
    fn into_compact(mut self, ordered: bool) -> CompactThetaSketch {
        let k = 1usize << self.header.lg_nom_size;
        let gadget_theta = self.header.theta;
        let adjusted_theta = if self.header.num_entries > k {
            select_excluding_zeros(&mut self.slots, k + 1).unwrap_or(gadget_theta)
        } else {
            gadget_theta
        };
        let min_theta = gadget_theta.min(adjusted_theta).min(self.union_theta);

        let mut entries: Vec<u64> = self
            .slots
            .into_iter()
            .filter(|&hash| hash != 0 && hash < min_theta)
            .collect();
        if ordered {
            entries.sort_unstable();
        }
        CompactThetaSketch::from_parts(
            entries,
            min_theta,
            self.seed_hash,
            self.header.is_empty,
            ordered,
        )
    }
}

/// Checks everything about a union image before it is read.
fn validate_union_image(
    mem: MemoryView<'_>,
    expected_seed_hash: u16,
) -> Result<TableHeader, Error> {
    mem.ensure_len(PREAMBLE_LONGS_UNION as usize * 8, "union preamble")?;
    Family::UNION.validate_id(mem.u8_at(FAMILY_BYTE))?;
    ensure_serial_version_is(SERIAL_VERSION, mem.u8_at(SER_VER_BYTE))?;
    ensure_preamble_longs_in(
        &[PREAMBLE_LONGS_UNION],
        mem.u8_at(PREAMBLE_LONGS_BYTE) & PREAMBLE_LONGS_MASK,
    )?;
    let header = TableHeader::read(mem);
    ensure_table_sizes(&header)?;
    if header.lg_cur_size < MIN_LG_ARR {
        return Err(Error::deserial(format!(
            "lg_arr {} is below the smallest hash table size {MIN_LG_ARR}",
            header.lg_cur_size
        )));
    }
    ensure_seed_hash_matches(expected_seed_hash, mem.u16_at(SEED_HASH_SHORT))?;
    ensure_slots_fit(mem, &header)?;
    let num_slots = 1usize << header.lg_cur_size;
    if header.num_entries > num_slots {
        return Err(Error::deserial(format!(
            "retained entries {} exceed hash table size {num_slots}",
            header.num_entries
        )));
    }
    Ok(header)
}

/// Checks only what reading the image without panicking needs.
fn check_union_layout(mem: MemoryView<'_>) -> Result<TableHeader, Error> {
    mem.ensure_len(PREAMBLE_LONGS_UNION as usize * 8, "union preamble")?;
    Family::UNION.validate_id(mem.u8_at(FAMILY_BYTE))?;
    let header = TableHeader::read(mem);
    ensure_table_sizes(&header)?;
    ensure_slots_fit(mem, &header)?;
    Ok(header)
}

fn ensure_table_sizes(header: &TableHeader) -> Result<(), Error> {
    if !(MIN_LG_K..=MAX_LG_K).contains(&header.lg_nom_size) {
        return Err(Error::deserial(format!(
            "lg_k {} is out of range [{MIN_LG_K}, {MAX_LG_K}]",
            header.lg_nom_size
        )));
    }
    if header.lg_cur_size > header.lg_nom_size + 1 {
        return Err(Error::deserial(format!(
            "lg_arr {} exceeds lg_k + 1 = {}",
            header.lg_cur_size,
            header.lg_nom_size + 1
        )));
    }
    Ok(())
}

fn ensure_slots_fit(mem: MemoryView<'_>, header: &TableHeader) -> Result<(), Error> {
    let needed = image_len(PREAMBLE_LONGS_UNION, 1 << header.lg_cur_size)
        .ok_or_else(|| Error::deserial("hash table size overflows"))?;
    mem.ensure_len(needed, "union hash table")
}

/// Builder for ThetaUnion
#[derive(Debug)]
pub struct ThetaUnionBuilder {
    lg_k: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    seed: u64,
}

impl Default for ThetaUnionBuilder {
    fn default() -> Self {
        Self {
            lg_k: DEFAULT_LG_K,
            resize_factor: ResizeFactor::X8,
            sampling_probability: 1.0,
            seed: DEFAULT_UPDATE_SEED,
        }
    }
}

impl ThetaUnionBuilder {
    /// Set lg_k (log2 of nominal size k), in range [4, 26].
    pub fn lg_k(mut self, lg_k: u8) -> Self {
        self.lg_k = lg_k;
        self
    }

    /// Set resize factor of the heap gadget.
    ///
    /// A buffer-backed gadget always starts at its full size.
    pub fn resize_factor(mut self, factor: ResizeFactor) -> Self {
        self.resize_factor = factor;
        self
    }

    /// Set sampling probability p, in range (0.0, 1.0].
    pub fn sampling_probability(mut self, probability: f32) -> Self {
        self.sampling_probability = probability;
        self
    }

    /// Set hash seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if !(MIN_LG_K..=MAX_LG_K).contains(&self.lg_k) {
            return Err(Error::invalid_argument(format!(
                "lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {}",
                self.lg_k
            )));
        }
        let p = self.sampling_probability;
        if !(p > 0.0 && p <= 1.0) {
            return Err(Error::invalid_argument(format!(
                "p must be in (0.0, 1.0], got {p}"
            )));
        }
        Ok(())
    }

    /// Build the ThetaUnion on the heap.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`](crate::error::ErrorKind::ConfigurationError) if lg_k
    /// or p is out of range.
    pub fn build(self) -> Result<ThetaUnion<'static>, Error> {
        self.validate()?;
        let gadget = ThetaHashTable::new(
            self.lg_k,
            self.resize_factor,
            self.sampling_probability,
            self.seed,
        );
        let union_theta = gadget.theta();
        Ok(ThetaUnion {
            gadget,
            union_theta,
        })
    }

    /// Build the ThetaUnion inside `mem`, which must span [`max_union_bytes`] of lg_k.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`](crate::error::ErrorKind::ConfigurationError) if lg_k
    /// or p is out of range, and
    /// [`CapacityExceeded`](crate::error::ErrorKind::CapacityExceeded) if `mem` is too
    /// small.
    pub fn build_in(self, mem: &mut [u8]) -> Result<ThetaUnion<'_>, Error> {
        self.validate()?;
        let required = max_union_bytes(self.lg_k);
        if mem.len() < required {
            return Err(Error::capacity_exceeded(required, mem.len()));
        }
        let gadget = ThetaHashTable::new_in(
            mem,
            self.lg_k,
            self.resize_factor,
            self.sampling_probability,
            self.seed,
        );
        let union_theta = gadget.theta();
        Ok(ThetaUnion {
            gadget,
            union_theta,
        })
    }
}
