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

//! Serialization constants for theta sketches and theta unions.

/// Current serialization version.
pub const SERIAL_VERSION: u8 = 3;
/// Legacy serialization version 1 (compact, ordered, three preamble longs, no seed hash).
pub const SERIAL_VERSION_1: u8 = 1;
/// Legacy serialization version 2 (compact, ordered, seed hash).
pub const SERIAL_VERSION_2: u8 = 2;

/// Preamble longs for an empty compact sketch.
pub const PREAMBLE_LONGS_EMPTY: u8 = 1;
/// Preamble longs for a compact sketch in exact mode.
pub const PREAMBLE_LONGS_EXACT: u8 = 2;
/// Preamble longs for a compact sketch in estimation mode, and for update sketches.
pub const PREAMBLE_LONGS_ESTIMATION: u8 = 3;
/// Preamble longs for a union image.
pub const PREAMBLE_LONGS_UNION: u8 = 4;
/// Preamble longs of every serial version 1 image.
pub const PREAMBLE_LONGS_V1: u8 = 3;

/// A serial version 1 image of at most this many bytes holds no entries.
pub const V1_EMPTY_BYTES: usize = 24;
/// A serial version 2 or 3 image of at most this many bytes holds no entries.
pub const MIN_NON_EMPTY_BYTES: usize = 8;

/// Offset of preamble longs byte (low 6 bits) and resize factor (high 2 bits).
pub const PREAMBLE_LONGS_BYTE: usize = 0;
/// Offset of serialization version byte.
pub const SER_VER_BYTE: usize = 1;
/// Offset of family ID byte.
pub const FAMILY_BYTE: usize = 2;
/// Offset of lg nominal entries byte.
pub const LG_NOM_LONGS_BYTE: usize = 3;
/// Offset of lg array longs byte.
pub const LG_ARR_LONGS_BYTE: usize = 4;
/// Offset of flags byte.
pub const FLAGS_BYTE: usize = 5;
/// Offset of seed hash short.
pub const SEED_HASH_SHORT: usize = 6;
/// Offset of retained entries int.
pub const RETAINED_ENTRIES_INT: usize = 8;
/// Offset of sampling probability float.
pub const P_FLOAT: usize = 12;
/// Offset of theta long.
pub const THETA_LONG: usize = 16;
/// Offset of union theta long (union images only).
pub const UNION_THETA_LONG: usize = 24;

pub const PREAMBLE_LONGS_MASK: u8 = 0x3F;
pub const RESIZE_FACTOR_SHIFT: u8 = 6;

pub const FLAG_IS_READ_ONLY: u8 = 1 << 1;
pub const FLAG_IS_EMPTY: u8 = 1 << 2;
pub const FLAG_IS_COMPACT: u8 = 1 << 3;
pub const FLAG_IS_ORDERED: u8 = 1 << 4;

/// Size of one serialized hash entry.
pub const HASH_SIZE_BYTES: usize = 8;
