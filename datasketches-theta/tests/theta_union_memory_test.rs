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

use datasketches_theta::error::ErrorKind;
use datasketches_theta::hash::DEFAULT_UPDATE_SEED;
use datasketches_theta::theta::MAX_THETA;
use datasketches_theta::theta::ThetaSketch;
use datasketches_theta::theta::ThetaUnion;
use datasketches_theta::theta::ThetaUnionView;
use datasketches_theta::theta::max_union_bytes;
use googletest::assert_that;
use googletest::matchers::eq;

const UNION_THETA_OFFSET: usize = 24;

fn stored_union_theta(buf: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[UNION_THETA_OFFSET..UNION_THETA_OFFSET + 8]);
    u64::from_le_bytes(word)
}

fn sketch_of(lg_k: u8, values: std::ops::Range<u64>) -> ThetaSketch {
    let mut sketch = ThetaSketch::builder().lg_k(lg_k).build();
    for value in values {
        sketch.update(value);
    }
    sketch
}

fn feed(union: &mut ThetaUnion<'_>, a: &ThetaSketch, b: &ThetaSketch) {
    union.merge(Some(a)).unwrap();
    union.merge_bytes(&b.compact(true).serialize()).unwrap();
    for value in 8000..12_000u64 {
        union.update(value);
    }
}

#[test]
fn test_direct_matches_heap() {
    let a = sketch_of(9, 0..5000);
    let b = sketch_of(11, 2500..9000);

    let mut heap = ThetaUnion::builder().lg_k(10).build().unwrap();
    let mut buf = vec![0u8; max_union_bytes(10)];
    let mut direct = ThetaUnion::builder().lg_k(10).build_in(&mut buf).unwrap();
    assert!(direct.is_direct());
    assert!(direct.is_empty());

    feed(&mut heap, &a, &b);
    feed(&mut direct, &a, &b);
    assert_eq!(direct.result(true), heap.result(true));
    assert_eq!(direct.union_theta64(), heap.union_theta64());
    assert_eq!(direct.num_retained(), heap.num_retained());

    let union_theta = direct.union_theta64();
    assert!(union_theta < MAX_THETA);
    drop(direct);
    assert_eq!(stored_union_theta(&buf), union_theta);
}

#[test]
fn test_wrap_after_drop() {
    let mut buf = vec![0u8; max_union_bytes(8)];
    let mut union = ThetaUnion::builder().lg_k(8).build_in(&mut buf).unwrap();
    union.merge(Some(&sketch_of(6, 0..1000))).unwrap();
    let expected = union.result(true);
    let union_theta = union.union_theta64();
    drop(union);

    let view = ThetaUnionView::wrap(&buf, DEFAULT_UPDATE_SEED).unwrap();
    assert_eq!(view.result(true), expected);
    assert_eq!(view.union_theta64(), union_theta);
    assert_eq!(view.lg_k(), 8);
    assert!(!view.is_empty());
    assert!(view.is_same_resource(&buf));
    assert!(!view.is_same_resource(&buf[..buf.len() - 8]));

    let view = ThetaUnionView::fast_wrap(&buf).unwrap();
    assert_eq!(view.estimate(), expected.estimate());

    let union = ThetaUnion::writable_wrap(&mut buf, DEFAULT_UPDATE_SEED).unwrap();
    assert!(union.is_direct());
    assert_eq!(union.result(true), expected);
    drop(union);

    let mut union = ThetaUnion::fast_wrap(&mut buf, DEFAULT_UPDATE_SEED).unwrap();
    assert_eq!(union.result(true), expected);
    union.merge(Some(&sketch_of(6, 1000..2000))).unwrap();
    let union_theta = union.union_theta64();
    drop(union);
    assert_eq!(stored_union_theta(&buf), union_theta);
}

#[test]
fn test_writable_wrap_grows_heap_image() {
    let mut heap = ThetaUnion::builder().lg_k(10).build().unwrap();
    for value in 0..10u64 {
        heap.update(value);
    }
    let image = heap.serialize_updatable();
    assert!(image.len() < max_union_bytes(10));

    let mut small = image.clone();
    let err = ThetaUnion::writable_wrap(&mut small, DEFAULT_UPDATE_SEED).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::CapacityExceeded));

    let mut buf = vec![0u8; max_union_bytes(10)];
    buf[..image.len()].copy_from_slice(&image);
    let mut direct = ThetaUnion::writable_wrap(&mut buf, DEFAULT_UPDATE_SEED).unwrap();
    assert_eq!(direct.result(true), heap.result(true));

    for value in 10..20_000u64 {
        heap.update(value);
        direct.update(value);
    }
    assert_eq!(direct.result(true), heap.result(true));
}

#[test]
fn test_wrap_rejects_invalid_images() {
    let mut buf = vec![0u8; max_union_bytes(5)];
    drop(ThetaUnion::builder().lg_k(5).build_in(&mut buf).unwrap());

    let err = ThetaUnion::writable_wrap(&mut buf, 123).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));
    let err = ThetaUnionView::wrap(&buf, 123).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));

    let mut corrupt = buf.clone();
    corrupt[2] = 3;
    let err = ThetaUnion::writable_wrap(&mut corrupt, DEFAULT_UPDATE_SEED).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::IncompatibleFamily));
    let err = ThetaUnion::fast_wrap(&mut corrupt, DEFAULT_UPDATE_SEED).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::IncompatibleFamily));

    let mut corrupt = buf.clone();
    corrupt[1] = 2;
    let err = ThetaUnion::writable_wrap(&mut corrupt, DEFAULT_UPDATE_SEED).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::UnknownFormatVersion));
    // Only the layout is checked on the fast path.
    assert!(ThetaUnion::fast_wrap(&mut corrupt, DEFAULT_UPDATE_SEED).is_ok());

    let mut corrupt = buf.clone();
    corrupt[4] = 9;
    let err = ThetaUnion::fast_wrap(&mut corrupt, DEFAULT_UPDATE_SEED).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedInput));

    let mut short = buf[..16].to_vec();
    let err = ThetaUnion::fast_wrap(&mut short, DEFAULT_UPDATE_SEED).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedInput));
}

#[test]
fn test_is_same_resource() {
    let mut buf = vec![0u8; max_union_bytes(5) + 8];
    let whole: *const [u8] = buf.as_slice();
    let prefix: *const [u8] = &buf[..max_union_bytes(5)];

    let heap = ThetaUnion::builder().lg_k(5).build().unwrap();
    assert!(!heap.is_same_resource(whole));

    let union = ThetaUnion::builder().lg_k(5).build_in(&mut buf).unwrap();
    assert!(union.is_same_resource(whole));
    assert!(!union.is_same_resource(prefix));
}

#[test]
fn test_direct_reset() {
    let mut buf = vec![0u8; max_union_bytes(6)];
    let mut union = ThetaUnion::builder().lg_k(6).build_in(&mut buf).unwrap();
    union.merge(Some(&sketch_of(6, 0..10_000))).unwrap();
    assert!(union.union_theta64() < MAX_THETA);

    union.reset();
    assert!(union.is_empty());
    assert_eq!(union.num_retained(), 0);
    assert_eq!(union.union_theta64(), MAX_THETA);
    drop(union);

    assert_eq!(stored_union_theta(&buf), MAX_THETA);
    let view = ThetaUnionView::wrap(&buf, DEFAULT_UPDATE_SEED).unwrap();
    assert!(view.is_empty());
    assert_eq!(view.num_retained(), 0);
    assert_eq!(view.estimate(), 0.0);
}
