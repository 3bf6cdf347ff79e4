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

//! Positional views over serialized sketch images.
//!
//! All offsets into a serialized image go through these two types. Accessors index the
//! underlying slice directly, so callers must check the image with [`MemoryView::ensure_len`]
//! before reading past the first preamble word.

use std::fmt;

use crate::codec::read_u16_le;
use crate::codec::read_u32_le;
use crate::codec::read_u64_le;
use crate::codec::write_u16_le;
use crate::codec::write_u32_le;
use crate::codec::write_u64_le;
use crate::error::Error;

/// Read-only view over a serialized image.
#[derive(Clone, Copy)]
pub(crate) struct MemoryView<'a> {
    bytes: &'a [u8],
}

impl<'a> MemoryView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }

    /// Fails with [`crate::error::ErrorKind::MalformedInput`] unless at least `needed` bytes
    /// are present.
    pub fn ensure_len(&self, needed: usize, tag: &'static str) -> Result<(), Error> {
        if self.bytes.len() >= needed {
            Ok(())
        } else {
            Err(Error::insufficient_data(tag)
                .with_context("required", needed)
                .with_context("actual", self.bytes.len()))
        }
    }

    pub fn u8_at(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    pub fn u16_at(&self, offset: usize) -> u16 {
        read_u16_le(self.bytes, offset)
    }

    pub fn u32_at(&self, offset: usize) -> u32 {
        read_u32_le(self.bytes, offset)
    }

    pub fn u64_at(&self, offset: usize) -> u64 {
        read_u64_le(self.bytes, offset)
    }

    pub fn f32_at(&self, offset: usize) -> f32 {
        f32::from_bits(self.u32_at(offset))
    }

    /// Returns the `index`-th hash following a preamble of `preamble_longs` 8-byte words.
    pub fn hash_at(&self, preamble_longs: u8, index: usize) -> u64 {
        self.u64_at(entry_offset(preamble_longs, index))
    }
}

/// Writable view over a serialized image.
pub(crate) struct MemoryViewMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> MemoryViewMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_view(&self) -> MemoryView<'_> {
        MemoryView::new(self.bytes)
    }

    pub fn put_u8(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }

    pub fn put_u16(&mut self, offset: usize, value: u16) {
        write_u16_le(self.bytes, offset, value);
    }

    pub fn put_u32(&mut self, offset: usize, value: u32) {
        write_u32_le(self.bytes, offset, value);
    }

    pub fn put_u64(&mut self, offset: usize, value: u64) {
        write_u64_le(self.bytes, offset, value);
    }

    pub fn put_f32(&mut self, offset: usize, value: f32) {
        self.put_u32(offset, value.to_bits());
    }

    pub fn put_hash(&mut self, preamble_longs: u8, index: usize, hash: u64) {
        self.put_u64(entry_offset(preamble_longs, index), hash);
    }

    /// Zeroes `count` hash slots following a preamble of `preamble_longs` words.
    pub fn clear_hashes(&mut self, preamble_longs: u8, count: usize) {
        let start = entry_offset(preamble_longs, 0);
        self.bytes[start..start + count * 8].fill(0);
    }
}

impl fmt::Debug for MemoryView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryView")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl fmt::Debug for MemoryViewMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryViewMut")
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[inline]
fn entry_offset(preamble_longs: u8, index: usize) -> usize {
    (preamble_longs as usize + index) << 3
}

/// Returns the number of bytes spanned by a preamble and `num_entries` hashes, or `None`
/// on overflow.
pub(crate) fn image_len(preamble_longs: u8, num_entries: usize) -> Option<usize> {
    num_entries
        .checked_add(preamble_longs as usize)?
        .checked_mul(8)
}
