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

//! Decoding of serialized sketches of serial versions 1, 2 and 3.
//!
//! | Version | Families | Empty when | Theta | Entries |
//! |---|---|---|---|---|
//! | 1 | SetSketch | at most 24 bytes | third long | ordered, after 3 longs |
//! | 2 | SetSketch | at most 8 bytes, or 1 long | MAX with 2 longs, else third long | ordered |
//! | 3 | Alpha, QuickSelect, Compact | as version 2 | as version 2 | per flags |
//!
//! Every offset the image is later read at is checked here, so scanning a decoded image
//! cannot go out of bounds.

use crate::codec::MemoryView;
use crate::codec::assert::ensure_family_in;
use crate::codec::assert::ensure_preamble_longs_in;
use crate::codec::assert::ensure_seed_hash_matches;
use crate::codec::family::Family;
use crate::codec::image_len;
use crate::error::Error;
use crate::theta::hash_table::MAX_LG_K;
use crate::theta::hash_table::MAX_THETA;
use crate::theta::serialization::*;

/// A validated serialized sketch.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SketchImage<'a> {
    mem: MemoryView<'a>,
    pub preamble_longs: u8,
    pub theta: u64,
    pub num_retained: usize,
    /// Number of slots to scan: `num_retained` for compact forms, the array size otherwise.
    pub num_slots: usize,
    pub is_empty: bool,
    pub is_ordered: bool,
    pub is_compact: bool,
}

impl<'a> SketchImage<'a> {
    pub fn hash_at(&self, index: usize) -> u64 {
        self.mem.hash_at(self.preamble_longs, index)
    }

    /// Iterates over the first `num_slots` slots.
    pub fn hashes(self) -> impl Iterator<Item = u64> + 'a {
        (0..self.num_slots).map(move |index| self.hash_at(index))
    }
}

/// Decodes a serialized sketch.
///
/// Returns `None` if the image is logically empty and holds neither entries nor theta.
pub(crate) fn decode_sketch(
    bytes: &[u8],
    expected_seed_hash: u16,
) -> Result<Option<SketchImage<'_>>, Error> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let mem = MemoryView::new(bytes);
    mem.ensure_len(FAMILY_BYTE + 1, "preamble")?;
    let serial_version = mem.u8_at(SER_VER_BYTE);
    let family_id = mem.u8_at(FAMILY_BYTE);
    match serial_version {
        SERIAL_VERSION_1 => decode_v1(mem, family_id),
        SERIAL_VERSION_2 => decode_v2(mem, family_id, expected_seed_hash),
        SERIAL_VERSION => decode_v3(mem, family_id, expected_seed_hash),
        _ => Err(Error::unsupported_serial_version("1, 2 or 3", serial_version)),
    }
}

fn decode_v1(mem: MemoryView<'_>, family_id: u8) -> Result<Option<SketchImage<'_>>, Error> {
    ensure_family_in(&[Family::SET_SKETCH], family_id, "serial version 1")?;
    if mem.len() <= V1_EMPTY_BYTES {
        return Ok(None);
    }
    let num_retained = mem.u32_at(RETAINED_ENTRIES_INT) as usize;
    ensure_entries_fit(mem, PREAMBLE_LONGS_V1, num_retained)?;
    Ok(Some(SketchImage {
        mem,
        preamble_longs: PREAMBLE_LONGS_V1,
        theta: mem.u64_at(THETA_LONG),
        num_retained,
        num_slots: num_retained,
        is_empty: false,
        is_ordered: true,
        is_compact: true,
    }))
}

fn decode_v2(
    mem: MemoryView<'_>,
    family_id: u8,
    expected_seed_hash: u16,
) -> Result<Option<SketchImage<'_>>, Error> {
    ensure_family_in(&[Family::SET_SKETCH], family_id, "serial version 2")?;
    let Some(preamble) = decode_preamble(mem, expected_seed_hash)? else {
        return Ok(None);
    };
    ensure_entries_fit(mem, preamble.preamble_longs, preamble.num_retained)?;
    Ok(Some(SketchImage {
        mem,
        preamble_longs: preamble.preamble_longs,
        theta: preamble.theta,
        num_retained: preamble.num_retained,
        num_slots: preamble.num_retained,
        is_empty: mem.u8_at(FLAGS_BYTE) & FLAG_IS_EMPTY != 0,
        is_ordered: true,
        is_compact: true,
    }))
}

fn decode_v3(
    mem: MemoryView<'_>,
    family_id: u8,
    expected_seed_hash: u16,
) -> Result<Option<SketchImage<'_>>, Error> {
    ensure_family_in(
        &[Family::ALPHA, Family::QUICKSELECT, Family::COMPACT],
        family_id,
        "serial version 3",
    )?;
    let Some(preamble) = decode_preamble(mem, expected_seed_hash)? else {
        return Ok(None);
    };
    let flags = mem.u8_at(FLAGS_BYTE);
    let is_ordered = flags & FLAG_IS_ORDERED != 0;
    let is_compact = flags & FLAG_IS_COMPACT != 0;
    let num_slots = if is_ordered || is_compact {
        preamble.num_retained
    } else {
        let lg_arr = mem.u8_at(LG_ARR_LONGS_BYTE);
        if lg_arr > MAX_LG_K + 1 {
            return Err(Error::deserial(format!(
                "lg_arr {lg_arr} exceeds the largest hash table size {}",
                MAX_LG_K + 1
            )));
        }
        1 << lg_arr
    };
    ensure_entries_fit(mem, preamble.preamble_longs, num_slots)?;
    Ok(Some(SketchImage {
        mem,
        preamble_longs: preamble.preamble_longs,
        theta: preamble.theta,
        num_retained: preamble.num_retained,
        num_slots,
        is_empty: flags & FLAG_IS_EMPTY != 0,
        is_ordered,
        is_compact,
    }))
}

struct Preamble {
    preamble_longs: u8,
    theta: u64,
    num_retained: usize,
}

/// Reads the preamble shared by serial versions 2 and 3.
fn decode_preamble(
    mem: MemoryView<'_>,
    expected_seed_hash: u16,
) -> Result<Option<Preamble>, Error> {
    if mem.len() <= MIN_NON_EMPTY_BYTES {
        return Ok(None);
    }
    ensure_seed_hash_matches(expected_seed_hash, mem.u16_at(SEED_HASH_SHORT))?;
    let preamble_longs = mem.u8_at(PREAMBLE_LONGS_BYTE) & PREAMBLE_LONGS_MASK;
    ensure_preamble_longs_in(
        &[
            PREAMBLE_LONGS_EMPTY,
            PREAMBLE_LONGS_EXACT,
            PREAMBLE_LONGS_ESTIMATION,
        ],
        preamble_longs,
    )?;
    if preamble_longs == PREAMBLE_LONGS_EMPTY {
        return Ok(None);
    }
    mem.ensure_len(preamble_longs as usize * 8, "preamble")?;
    let num_retained = mem.u32_at(RETAINED_ENTRIES_INT) as usize;
    let theta = if preamble_longs == PREAMBLE_LONGS_EXACT {
        if num_retained == 0 {
            return Err(Error::deserial(
                "exact mode sketch with two preamble longs must retain at least one entry",
            ));
        }
        MAX_THETA
    } else {
        mem.u64_at(THETA_LONG)
    };
    Ok(Some(Preamble {
        preamble_longs,
        theta,
        num_retained,
    }))
}

fn ensure_entries_fit(
    mem: MemoryView<'_>,
    preamble_longs: u8,
    num_entries: usize,
) -> Result<(), Error> {
    let needed = image_len(preamble_longs, num_entries)
        .ok_or_else(|| Error::deserial(format!("entry count {num_entries} overflows")))?;
    mem.ensure_len(needed, "entries")
}
