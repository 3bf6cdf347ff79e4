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

use crate::theta::CompactThetaSketch;
use crate::theta::ThetaSketch;
use crate::theta::WrappedCompactThetaSketch;

mod private {
    // Sealed trait to prevent external implementations of ThetaSketchView.
    pub trait Sealed {}
}

impl private::Sealed for ThetaSketch {}
impl private::Sealed for CompactThetaSketch {}
impl private::Sealed for WrappedCompactThetaSketch<'_> {}

/// Read access to a theta sketch, whatever its representation.
///
/// This is what [`ThetaUnion::merge`](crate::theta::ThetaUnion::merge) consumes.
pub trait ThetaSketchView: private::Sealed {
    /// Returns theta as u64.
    fn theta64(&self) -> u64;

    /// Returns the number of retained hashes.
    fn num_retained(&self) -> usize;

    /// Returns true if the sketch has never seen any input.
    fn is_empty(&self) -> bool;

    /// Returns true if [`cache`](Self::cache) yields exactly the retained hashes in
    /// ascending order.
    fn is_ordered(&self) -> bool;

    /// Returns true if the hashes live in memory the sketch does not own.
    fn is_direct(&self) -> bool {
        false
    }

    /// Returns the 16-bit fingerprint of the seed the sketch was built with.
    fn seed_hash(&self) -> u16;

    /// Iterates over the backing storage in storage order.
    ///
    /// Hash-table forms yield every slot, including empty (`0`) ones.
    fn cache(&self) -> impl Iterator<Item = u64> + '_;
}
