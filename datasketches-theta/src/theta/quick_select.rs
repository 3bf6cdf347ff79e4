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

//! Selection of the k-th smallest hash in expected linear time.
//!
//! Both functions reorder their input.

/// Returns the `pivot`-th smallest nonzero value (1-based) of `arr`, or `None` when `arr`
/// holds fewer than `pivot` nonzero values.
///
/// Nonzero values are moved to the front before selecting.
pub(crate) fn select_excluding_zeros(arr: &mut [u64], pivot: usize) -> Option<u64> {
    let mut non_zeros = 0;
    for i in 0..arr.len() {
        if arr[i] != 0 {
            arr.swap(non_zeros, i);
            non_zeros += 1;
        }
    }
    if pivot == 0 || pivot > non_zeros {
        return None;
    }
    Some(select(&mut arr[..non_zeros], pivot - 1))
}

/// Returns the value of rank `k` (0-based) of `arr`.
pub(crate) fn select(arr: &mut [u64], k: usize) -> u64 {
    let mut lo = 0;
    let mut hi = arr.len() - 1;
    while lo < hi {
        let p = partition(arr, lo, hi);
        if p == k {
            return arr[k];
        } else if p < k {
            lo = p + 1;
        } else {
            hi = p - 1;
        }
    }
    arr[k]
}

fn partition(arr: &mut [u64], lo: usize, hi: usize) -> usize {
    let mid = lo + (hi - lo) / 2;
    arr.swap(mid, hi);
    let pivot = arr[hi];
    let mut store = lo;
    for i in lo..hi {
        if arr[i] < pivot {
            arr.swap(store, i);
            store += 1;
        }
    }
    arr.swap(store, hi);
    store
}
