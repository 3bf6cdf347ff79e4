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

//! Quick-select hash table backing update sketches and unions.
//!
//! Slots hold 63-bit hashes, `0` marks an empty slot. Collisions are resolved with open
//! addressing and an odd stride derived from the hash. While the table is smaller than
//! `2 * k` it grows by the resize factor once it is half full. At full size it is rebuilt
//! once it is 15/16 full: theta drops to the (k+1)-th smallest hash and only the `k`
//! smaller hashes are kept.
//!
//! The slots live either on the heap or in a caller-supplied buffer laid out as a union
//! image. In the latter case every header field is written through to the buffer after
//! each mutation.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

use tracing::debug;

use crate::ResizeFactor;
use crate::codec::MemoryView;
use crate::codec::MemoryViewMut;
use crate::codec::family::Family;
use crate::hash::MurmurHash3X64128;
use crate::hash::compute_seed_hash;
use crate::theta::quick_select::select_excluding_zeros;
use crate::theta::serialization::FAMILY_BYTE;
use crate::theta::serialization::FLAGS_BYTE;
use crate::theta::serialization::FLAG_IS_EMPTY;
use crate::theta::serialization::LG_ARR_LONGS_BYTE;
use crate::theta::serialization::LG_NOM_LONGS_BYTE;
use crate::theta::serialization::P_FLOAT;
use crate::theta::serialization::PREAMBLE_LONGS_BYTE;
use crate::theta::serialization::PREAMBLE_LONGS_MASK;
use crate::theta::serialization::PREAMBLE_LONGS_UNION;
use crate::theta::serialization::RESIZE_FACTOR_SHIFT;
use crate::theta::serialization::RETAINED_ENTRIES_INT;
use crate::theta::serialization::SEED_HASH_SHORT;
use crate::theta::serialization::SERIAL_VERSION;
use crate::theta::serialization::SER_VER_BYTE;
use crate::theta::serialization::THETA_LONG;
use crate::theta::serialization::UNION_THETA_LONG;

/// Minimum log2 of the nominal size.
pub const MIN_LG_K: u8 = 4;
/// Maximum log2 of the nominal size.
pub const MAX_LG_K: u8 = 26;
/// Default log2 of the nominal size.
pub const DEFAULT_LG_K: u8 = 12;
/// Theta of a sketch that has not sampled anything, i.e. 1.0.
pub const MAX_THETA: u64 = i64::MAX as u64;

pub(crate) const MIN_LG_ARR: u8 = 5;

const STRIDE_HASH_BITS: u8 = 7;
const STRIDE_MASK: u64 = (1 << STRIDE_HASH_BITS) - 1;

const RESIZE_THRESHOLD: f64 = 0.5;
const REBUILD_THRESHOLD: f64 = 15.0 / 16.0;

enum Slots<'a> {
    Heap(Vec<u64>),
    /// Slots following the union preamble of a caller-supplied buffer.
    Direct(MemoryViewMut<'a>),
}

impl Slots<'_> {
    fn get(&self, index: usize) -> u64 {
        match self {
            Slots::Heap(slots) => slots[index],
            Slots::Direct(mem) => mem.as_view().hash_at(PREAMBLE_LONGS_UNION, index),
        }
    }

    fn set(&mut self, index: usize, hash: u64) {
        match self {
            Slots::Heap(slots) => slots[index] = hash,
            Slots::Direct(mem) => mem.put_hash(PREAMBLE_LONGS_UNION, index, hash),
        }
    }

    fn clear(&mut self, len: usize) {
        match self {
            Slots::Heap(slots) => {
                slots.clear();
                slots.resize(len, 0);
            }
            Slots::Direct(mem) => mem.clear_hashes(PREAMBLE_LONGS_UNION, len),
        }
    }
}

impl fmt::Debug for Slots<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slots::Heap(slots) => f.debug_tuple("Heap").field(&slots.len()).finish(),
            Slots::Direct(mem) => f.debug_tuple("Direct").field(&mem.len()).finish(),
        }
    }
}

/// Preamble fields shared by update sketch images and union images.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableHeader {
    pub lg_nom_size: u8,
    pub lg_cur_size: u8,
    pub resize_factor: ResizeFactor,
    pub sampling_probability: f32,
    pub theta: u64,
    pub num_entries: usize,
    pub is_empty: bool,
}

impl TableHeader {
    /// Reads the header of an image whose length has already been checked.
    pub fn read(mem: MemoryView<'_>) -> Self {
        Self {
            lg_nom_size: mem.u8_at(LG_NOM_LONGS_BYTE),
            lg_cur_size: mem.u8_at(LG_ARR_LONGS_BYTE),
            resize_factor: ResizeFactor::from_lg_value(
                mem.u8_at(PREAMBLE_LONGS_BYTE) >> RESIZE_FACTOR_SHIFT,
            ),
            sampling_probability: mem.f32_at(P_FLOAT),
            theta: mem.u64_at(THETA_LONG),
            num_entries: mem.u32_at(RETAINED_ENTRIES_INT) as usize,
            is_empty: mem.u8_at(FLAGS_BYTE) & FLAG_IS_EMPTY != 0,
        }
    }

    fn write(
        &self,
        mem: &mut MemoryViewMut<'_>,
        preamble_longs: u8,
        family: Family,
        seed_hash: u16,
    ) {
        let flags = if self.is_empty { FLAG_IS_EMPTY } else { 0 };
        mem.put_u8(
            PREAMBLE_LONGS_BYTE,
            (self.resize_factor.lg_value() << RESIZE_FACTOR_SHIFT)
                | (preamble_longs & PREAMBLE_LONGS_MASK),
        );
        mem.put_u8(SER_VER_BYTE, SERIAL_VERSION);
        mem.put_u8(FAMILY_BYTE, family.id);
        mem.put_u8(LG_NOM_LONGS_BYTE, self.lg_nom_size);
        mem.put_u8(LG_ARR_LONGS_BYTE, self.lg_cur_size);
        mem.put_u8(FLAGS_BYTE, flags);
        mem.put_u16(SEED_HASH_SHORT, seed_hash);
        mem.put_u32(RETAINED_ENTRIES_INT, self.num_entries as u32);
        mem.put_f32(P_FLOAT, self.sampling_probability);
        mem.put_u64(THETA_LONG, self.theta);
    }
}

/// Hash table for theta sketches
#[derive(Debug)]
pub(crate) struct ThetaHashTable<'a> {
    lg_cur_size: u8,
    lg_nom_size: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    seed: u64,
    seed_hash: u16,
    theta: u64,
    num_entries: usize,
    is_empty: bool,
    slots: Slots<'a>,
}

impl ThetaHashTable<'static> {
    pub fn new(
        lg_nom_size: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        seed: u64,
    ) -> Self {
        let lg_cur_size = starting_lg_size(lg_nom_size, resize_factor);
        Self {
            lg_cur_size,
            lg_nom_size,
            resize_factor,
            sampling_probability,
            seed,
            seed_hash: compute_seed_hash(seed),
            theta: starting_theta(sampling_probability),
            num_entries: 0,
            is_empty: true,
            slots: Slots::Heap(vec![0; 1 << lg_cur_size]),
        }
    }

    /// Rebuilds a heap table from a checked image whose slots follow `preamble_longs` words.
    pub fn from_image(mem: MemoryView<'_>, preamble_longs: u8, seed: u64) -> Self {
        let header = TableHeader::read(mem);
        let slots = (0..1usize << header.lg_cur_size)
            .map(|i| mem.hash_at(preamble_longs, i))
            .collect();
        Self::from_header(header, seed, Slots::Heap(slots))
    }
}

impl<'a> ThetaHashTable<'a> {
    /// Creates an empty full-size table inside `mem`, writing a complete union preamble.
    ///
    /// `mem` must hold a union preamble followed by `2^(lg_nom_size + 1)` slots.
    pub fn new_in(
        mem: &'a mut [u8],
        lg_nom_size: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        seed: u64,
    ) -> Self {
        let lg_cur_size = lg_nom_size + 1;
        let mut slots = Slots::Direct(MemoryViewMut::new(mem));
        slots.clear(1 << lg_cur_size);
        let mut table = Self {
            lg_cur_size,
            lg_nom_size,
            resize_factor,
            sampling_probability,
            seed,
            seed_hash: compute_seed_hash(seed),
            theta: starting_theta(sampling_probability),
            num_entries: 0,
            is_empty: true,
            slots,
        };
        let header = table.header();
        let seed_hash = table.seed_hash;
        if let Some(mem) = table.memory_mut() {
            header.write(mem, PREAMBLE_LONGS_UNION, Family::UNION, seed_hash);
            mem.put_u64(UNION_THETA_LONG, header.theta);
        }
        table
    }

    /// Wraps a checked union image, growing its slot array in place to full size.
    ///
    /// `mem` must hold a union preamble followed by `2^(lg_nom_size + 1)` slots.
    pub fn wrap_memory(mem: &'a mut [u8], seed: u64) -> Self {
        let header = TableHeader::read(MemoryView::new(mem));
        let slots = Slots::Direct(MemoryViewMut::new(mem));
        let mut table = Self::from_header(header, seed, slots);
        let full_size = table.lg_nom_size + 1;
        if table.lg_cur_size < full_size {
            table.resize_to(full_size);
        }
        table
    }

    fn from_header(header: TableHeader, seed: u64, slots: Slots<'a>) -> Self {
        Self {
            lg_cur_size: header.lg_cur_size,
            lg_nom_size: header.lg_nom_size,
            resize_factor: header.resize_factor,
            sampling_probability: header.sampling_probability,
            seed,
            seed_hash: compute_seed_hash(seed),
            theta: header.theta,
            num_entries: header.num_entries,
            is_empty: header.is_empty,
            slots,
        }
    }

    /// Hashes `value` and marks the table non-empty.
    ///
    /// Returns the hash, or `0` if the hash is screened out by theta.
    pub fn hash_and_screen<T: Hash>(&mut self, value: T) -> u64 {
        self.mark_non_empty();
        let mut hasher = MurmurHash3X64128::with_seed(self.seed);
        value.hash(&mut hasher);
        let hash = hasher.finish() >> 1;
        if hash >= self.theta { 0 } else { hash }
    }

    /// Inserts an already computed hash, bypassing the hash function.
    ///
    /// Marks the table non-empty even if the hash is rejected. Returns whether the hash
    /// was added.
    pub fn try_insert(&mut self, hash: u64) -> bool {
        self.mark_non_empty();
        if hash == 0 || hash >= self.theta {
            return false;
        }
        let Some((index, false)) = self.find(hash) else {
            return false;
        };
        self.slots.set(index, hash);
        self.num_entries += 1;
        if self.num_entries > capacity(self.lg_cur_size, self.lg_nom_size) {
            if self.lg_cur_size <= self.lg_nom_size {
                self.resize();
            } else {
                self.rebuild();
            }
        }
        self.sync_header();
        true
    }

    /// Returns the slot for `hash` and whether it already holds it, or `None` if the
    /// probe sequence visited every slot without finding either.
    fn find(&self, hash: u64) -> Option<(usize, bool)> {
        let mask = (1usize << self.lg_cur_size) - 1;
        let stride = stride(hash, self.lg_cur_size);
        let start = (hash as usize) & mask;
        let mut index = start;
        loop {
            let probe = self.slots.get(index);
            if probe == 0 {
                return Some((index, false));
            }
            if probe == hash {
                return Some((index, true));
            }
            index = (index + stride) & mask;
            if index == start {
                return None;
            }
        }
    }

    fn resize(&mut self) {
        let lg_new_size = (self.lg_cur_size + self.resize_factor.lg_value().max(1))
            .min(self.lg_nom_size + 1);
        self.resize_to(lg_new_size);
    }

    fn resize_to(&mut self, lg_new_size: u8) {
        let from = self.lg_cur_size;
        let entries: Vec<u64> = self.iter().collect();
        self.reinsert(lg_new_size, &entries);
        self.sync_header();
        debug!(from, to = lg_new_size, "resized theta hash table");
    }

    /// Keeps the `k` smallest entries and lowers theta to the (k+1)-th smallest.
    fn rebuild(&mut self) {
        let k = 1usize << self.lg_nom_size;
        let mut entries: Vec<u64> = self.raw_slots().collect();
        if let Some(theta) = select_excluding_zeros(&mut entries, k + 1) {
            self.theta = theta;
        }
        let theta = self.theta;
        entries.retain(|&hash| hash != 0 && hash < theta);
        self.reinsert(self.lg_cur_size, &entries);
        debug!(
            lg_k = self.lg_nom_size,
            theta = self.theta,
            retained = self.num_entries,
            "rebuilt theta hash table"
        );
    }

    fn reinsert(&mut self, lg_size: u8, entries: &[u64]) {
        self.lg_cur_size = lg_size;
        self.slots.clear(1 << lg_size);
        self.num_entries = 0;
        for &hash in entries {
            if let Some((index, false)) = self.find(hash) {
                self.slots.set(index, hash);
                self.num_entries += 1;
            }
        }
    }

    /// Reduces the table to at most `k` entries.
    pub fn trim(&mut self) {
        if self.num_entries > (1 << self.lg_nom_size) {
            self.rebuild();
            self.sync_header();
        }
    }

    /// Clears the table back to its freshly constructed state.
    pub fn reset(&mut self) {
        let lg_size = match self.slots {
            Slots::Heap(_) => starting_lg_size(self.lg_nom_size, self.resize_factor),
            Slots::Direct(_) => self.lg_nom_size + 1,
        };
        self.lg_cur_size = lg_size;
        self.slots.clear(1 << lg_size);
        self.num_entries = 0;
        self.theta = starting_theta(self.sampling_probability);
        self.is_empty = true;
        self.sync_header();
    }

    fn mark_non_empty(&mut self) {
        if self.is_empty {
            self.is_empty = false;
            self.sync_header();
        }
    }

    /// Writes the mutable header fields through to the backing buffer, if any.
    fn sync_header(&mut self) {
        let header = self.header();
        if let Some(mem) = self.memory_mut() {
            mem.put_u8(LG_ARR_LONGS_BYTE, header.lg_cur_size);
            mem.put_u8(FLAGS_BYTE, if header.is_empty { FLAG_IS_EMPTY } else { 0 });
            mem.put_u32(RETAINED_ENTRIES_INT, header.num_entries as u32);
            mem.put_u64(THETA_LONG, header.theta);
        }
    }

    pub fn header(&self) -> TableHeader {
        TableHeader {
            lg_nom_size: self.lg_nom_size,
            lg_cur_size: self.lg_cur_size,
            resize_factor: self.resize_factor,
            sampling_probability: self.sampling_probability,
            theta: self.theta,
            num_entries: self.num_entries,
            is_empty: self.is_empty,
        }
    }

    /// Writes the preamble and every slot into `mem`, which must hold
    /// `preamble_longs + 2^lg_cur_size` words.
    pub fn write_image(&self, mem: &mut MemoryViewMut<'_>, preamble_longs: u8, family: Family) {
        self.header().write(mem, preamble_longs, family, self.seed_hash);
        for (index, hash) in self.raw_slots().enumerate() {
            mem.put_hash(preamble_longs, index, hash);
        }
    }

    /// Iterates over the retained hashes.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.raw_slots().filter(|&hash| hash != 0)
    }

    /// Iterates over every slot in storage order, including empty ones.
    pub fn raw_slots(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.num_slots()).map(|index| self.slots.get(index))
    }

    pub fn num_slots(&self) -> usize {
        1 << self.lg_cur_size
    }

    pub fn memory(&self) -> Option<MemoryView<'_>> {
        match &self.slots {
            Slots::Heap(_) => None,
            Slots::Direct(mem) => Some(mem.as_view()),
        }
    }

    pub fn memory_mut(&mut self) -> Option<&mut MemoryViewMut<'a>> {
        match &mut self.slots {
            Slots::Heap(_) => None,
            Slots::Direct(mem) => Some(mem),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.slots, Slots::Direct(_))
    }

    pub fn theta(&self) -> u64 {
        self.theta
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn lg_nom_size(&self) -> u8 {
        self.lg_nom_size
    }

    #[cfg(test)]
    pub fn lg_cur_size(&self) -> u8 {
        self.lg_cur_size
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }
}

fn starting_theta(sampling_probability: f32) -> u64 {
    if sampling_probability < 1.0 {
        (MAX_THETA as f64 * sampling_probability as f64) as u64
    } else {
        MAX_THETA
    }
}

/// Returns the starting log2 size such that growing by `resize_factor` lands exactly on
/// the full size `lg_nom_size + 1`.
fn starting_lg_size(lg_nom_size: u8, resize_factor: ResizeFactor) -> u8 {
    let lg_target = lg_nom_size + 1;
    let lg_rf = resize_factor.lg_value();
    if lg_target <= MIN_LG_ARR {
        MIN_LG_ARR
    } else if lg_rf == 0 {
        lg_target
    } else {
        (lg_target - MIN_LG_ARR) % lg_rf + MIN_LG_ARR
    }
}

fn capacity(lg_cur_size: u8, lg_nom_size: u8) -> usize {
    let fraction = if lg_cur_size <= lg_nom_size {
        RESIZE_THRESHOLD
    } else {
        REBUILD_THRESHOLD
    };
    (fraction * (1usize << lg_cur_size) as f64) as usize
}

#[inline]
fn stride(hash: u64, lg_size: u8) -> usize {
    (2 * ((hash >> lg_size) & STRIDE_MASK) + 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap_table(lg_k: u8) -> ThetaHashTable<'static> {
        ThetaHashTable::new(lg_k, ResizeFactor::X8, 1.0, crate::hash::DEFAULT_UPDATE_SEED)
    }

    #[test]
    fn test_starting_lg_size() {
        assert_eq!(starting_lg_size(4, ResizeFactor::X8), 5);
        assert_eq!(starting_lg_size(5, ResizeFactor::X8), 6);
        assert_eq!(starting_lg_size(12, ResizeFactor::X8), 7);
        assert_eq!(starting_lg_size(12, ResizeFactor::X2), 5);
        assert_eq!(starting_lg_size(12, ResizeFactor::X4), 5);
        assert_eq!(starting_lg_size(6, ResizeFactor::X4), 5);
        assert_eq!(starting_lg_size(12, ResizeFactor::X1), 13);
    }

    #[test]
    fn test_capacity_thresholds() {
        assert_eq!(capacity(5, 12), 16);
        assert_eq!(capacity(13, 12), 7680);
    }

    #[test]
    fn test_duplicate_and_screened_hashes() {
        let mut table = heap_table(5);
        assert!(table.try_insert(42));
        assert!(!table.try_insert(42));
        assert!(!table.try_insert(0));
        assert!(!table.try_insert(MAX_THETA));
        assert_eq!(table.num_entries(), 1);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_rejected_hash_still_marks_non_empty() {
        let mut table = heap_table(5);
        assert!(!table.try_insert(MAX_THETA));
        assert!(!table.is_empty());
        assert_eq!(table.num_entries(), 0);
    }

    #[test]
    fn test_grows_then_rebuilds() {
        let mut table = heap_table(5);
        for i in 1..=1000u64 {
            table.try_insert(i * 7919);
        }
        assert_eq!(table.lg_cur_size(), 6);
        assert!(table.theta() < MAX_THETA);
        assert!(table.num_entries() <= capacity(6, 5));
        assert!(table.iter().all(|hash| hash < table.theta()));

        table.trim();
        assert_eq!(table.num_entries(), 32);
        assert!(table.iter().all(|hash| hash < table.theta()));
    }

    #[test]
    fn test_rebuild_keeps_k_smallest() {
        let mut table = ThetaHashTable::new(5, ResizeFactor::X1, 1.0, 0);
        let hashes: Vec<u64> = (1..=61u64).map(|i| i << 20).collect();
        for &hash in &hashes {
            table.try_insert(hash);
        }
        // 61 > 15/16 * 64 triggers a rebuild at the 61st insert.
        assert_eq!(table.num_entries(), 32);
        assert_eq!(table.theta(), 33 << 20);
        let mut retained: Vec<u64> = table.iter().collect();
        retained.sort_unstable();
        assert_eq!(retained, hashes[..32].to_vec());
    }

    #[test]
    fn test_sampling_probability_lowers_starting_theta() {
        let table = ThetaHashTable::new(12, ResizeFactor::X8, 0.5, 0);
        assert!(table.theta() < MAX_THETA);
        assert_eq!(table.theta(), starting_theta(0.5));
    }

    #[test]
    fn test_reset() {
        let mut table = heap_table(5);
        for i in 1..=1000u64 {
            table.try_insert(i << 40);
        }
        table.reset();
        assert!(table.is_empty());
        assert_eq!(table.num_entries(), 0);
        assert_eq!(table.theta(), MAX_THETA);
        assert_eq!(table.lg_cur_size(), starting_lg_size(5, ResizeFactor::X8));
    }

    #[test]
    fn test_direct_table_writes_header_through() {
        let mut buf = vec![0u8; 32 + 8 * 64];
        let mut table = ThetaHashTable::new_in(&mut buf, 5, ResizeFactor::X8, 1.0, 0);
        assert_eq!(table.lg_cur_size(), 6);
        table.try_insert(12345);
        table.try_insert(67890);
        let header = TableHeader::read(table.memory().unwrap());
        assert_eq!(header.num_entries, 2);
        assert!(!header.is_empty);
        assert_eq!(header.theta, MAX_THETA);

        drop(table);
        let table = ThetaHashTable::wrap_memory(&mut buf, 0);
        let mut hashes: Vec<u64> = table.iter().collect();
        hashes.sort_unstable();
        assert_eq!(hashes, vec![12345, 67890]);
    }

    #[test]
    fn test_wrap_memory_grows_in_place() {
        let mut heap =
            ThetaHashTable::new(6, ResizeFactor::X4, 1.0, crate::hash::DEFAULT_UPDATE_SEED);
        for i in 1..=10u64 {
            heap.try_insert(i << 30);
        }
        assert_eq!(heap.lg_cur_size(), 5);

        let mut buf = vec![0u8; 32 + 8 * 128];
        let mut mem = MemoryViewMut::new(&mut buf);
        heap.write_image(&mut mem, PREAMBLE_LONGS_UNION, Family::UNION);

        let table = ThetaHashTable::wrap_memory(&mut buf, crate::hash::DEFAULT_UPDATE_SEED);
        assert_eq!(table.lg_cur_size(), 7);
        assert_eq!(table.num_entries(), 10);
        let header = TableHeader::read(table.memory().unwrap());
        assert_eq!(header.lg_cur_size, 7);
    }
}
