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

//! Theta sketch implementation for cardinality estimation and set union.
//!
//! Theta sketch is a generalization of the Kth Minimum Value (KMV) sketch that uses
//! a hash table to store retained entries and a theta parameter (sampling threshold)
//! to control memory usage. When the hash table reaches capacity, theta is reduced
//! to maintain the nominal size k.
//!
//! # Overview
//!
//! - [`ThetaSketch`]: mutable sketch for building from input data
//! - [`CompactThetaSketch`]: immutable sketch holding only its retained hashes
//! - [`WrappedCompactThetaSketch`]: compact sketch read in place from serialized bytes
//! - [`ThetaUnion`]: union of any number of sketches, on the heap or in a caller buffer
//! - [`ThetaUnionView`]: read-only view of a serialized union
//!
//! A union only ever lowers its theta. Its result is never more precise than the least
//! precise sketch merged into it.
//!
//! # Examples
//!
//! ```
//! # use datasketches_theta::theta::CompactThetaSketch;
//! # use datasketches_theta::theta::ThetaSketch;
//! # use datasketches_theta::theta::ThetaUnion;
//! let mut sketch = ThetaSketch::builder().lg_k(10).build();
//! for i in 0..10_000 {
//!     sketch.update(i);
//! }
//! let bytes = sketch.compact(true).serialize();
//!
//! let mut union = ThetaUnion::builder().lg_k(10).build().unwrap();
//! union.merge_bytes(&bytes).unwrap();
//! for i in 5_000..15_000 {
//!     union.update(i);
//! }
//!
//! let result: CompactThetaSketch = union.result(true);
//! assert!(result.num_retained() <= 1 << 10);
//! assert!((result.estimate() - 15_000.0).abs() < 15_000.0 * 0.1);
//! ```

mod compact;
mod decode;
mod hash_table;
mod quick_select;
mod serialization;
mod sketch;
mod union;
mod view;

pub use self::compact::CompactThetaSketch;
pub use self::compact::WrappedCompactThetaSketch;
pub use self::hash_table::DEFAULT_LG_K;
pub use self::hash_table::MAX_LG_K;
pub use self::hash_table::MAX_THETA;
pub use self::hash_table::MIN_LG_K;
pub use self::sketch::ThetaSketch;
pub use self::sketch::ThetaSketchBuilder;
pub use self::union::ThetaUnion;
pub use self::union::ThetaUnionBuilder;
pub use self::union::ThetaUnionView;
pub use self::union::max_union_bytes;
pub use self::view::ThetaSketchView;
