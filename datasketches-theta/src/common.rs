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

/// Growth factor of a hash table between its starting size and its full size.
///
/// The value is stored in the top two bits of the first preamble byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeFactor {
    /// Start at full size.
    X1,
    /// Double on every resize.
    X2,
    /// Quadruple on every resize.
    X4,
    /// Grow eightfold on every resize.
    #[default]
    X8,
}

impl ResizeFactor {
    /// Returns log2 of the growth factor.
    pub fn lg_value(&self) -> u8 {
        match self {
            ResizeFactor::X1 => 0,
            ResizeFactor::X2 => 1,
            ResizeFactor::X4 => 2,
            ResizeFactor::X8 => 3,
        }
    }

    pub(crate) fn from_lg_value(lg: u8) -> Self {
        match lg & 0x3 {
            0 => ResizeFactor::X1,
            1 => ResizeFactor::X2,
            2 => ResizeFactor::X4,
            _ => ResizeFactor::X8,
        }
    }
}

/// Canonicalize double value for compatibility with Java
pub(crate) fn canonical_double(value: f64) -> i64 {
    if value.is_nan() {
        // Java's Double.doubleToLongBits() NaN value
        0x7ff8000000000000i64
    } else {
        // -0.0 + 0.0 == +0.0 under IEEE754 roundTiesToEven rounding mode,
        // which Rust guarantees. Thus, by adding a positive zero we
        // canonicalize signed zero without any branches in one instruction.
        (value + 0.0).to_bits() as i64
    }
}
