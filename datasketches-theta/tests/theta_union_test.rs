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

use datasketches_theta::error::Error;
use datasketches_theta::error::ErrorKind;
use datasketches_theta::hash::DEFAULT_UPDATE_SEED;
use datasketches_theta::theta::CompactThetaSketch;
use datasketches_theta::theta::MAX_THETA;
use datasketches_theta::theta::ThetaSketch;
use datasketches_theta::theta::ThetaSketchView;
use datasketches_theta::theta::ThetaUnion;
use datasketches_theta::theta::WrappedCompactThetaSketch;
use googletest::assert_that;
use googletest::matchers::eq;
use googletest::matchers::le;
use googletest::matchers::near;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn sketch_of(lg_k: u8, values: std::ops::Range<u64>) -> ThetaSketch {
    let mut sketch = ThetaSketch::builder().lg_k(lg_k).build();
    for value in values {
        sketch.update(value);
    }
    sketch
}

fn merged(merge: impl FnOnce(&mut ThetaUnion<'static>) -> Result<(), Error>) -> CompactThetaSketch {
    let mut union = ThetaUnion::builder().build().unwrap();
    merge(&mut union).unwrap();
    union.result(true)
}

#[test]
fn test_empty_union() {
    let union = ThetaUnion::builder().build().unwrap();
    assert!(union.is_empty());
    assert!(!union.is_direct());
    assert_eq!(union.lg_k(), 12);
    assert_eq!(union.estimate(), 0.0);
    assert_eq!(union.union_theta64(), MAX_THETA);

    let result = union.result(true);
    assert!(result.is_empty());
    assert_eq!(result.num_retained(), 0);
    assert_eq!(result.theta64(), MAX_THETA);
    assert_eq!(result.serialize().len(), 8);
}

#[test]
fn test_exact_mode_nominal_16() {
    let a = sketch_of(4, 0..16);
    let b = sketch_of(4, 16..16);
    let mut union = ThetaUnion::builder().lg_k(4).build().unwrap();
    union.merge(Some(&a)).unwrap();
    union.merge(Some(&b)).unwrap();
    assert_eq!(union.estimate(), 16.0);

    let result = union.result(true);
    assert!(!result.is_estimation_mode());
    assert_eq!(result.num_retained(), 16);

    let mut bytes_union = ThetaUnion::builder().lg_k(4).build().unwrap();
    bytes_union.merge_bytes(&a.compact(true).serialize()).unwrap();
    bytes_union.merge_bytes(&b.compact(true).serialize()).unwrap();
    assert_eq!(bytes_union.result(true), result);
}

#[test]
fn test_overlapping_sketches() {
    let a = sketch_of(12, 0..1000);
    let b = sketch_of(12, 500..1500);
    let mut union = ThetaUnion::builder().build().unwrap();
    union.merge(Some(&a)).unwrap();
    union.merge(Some(&b.compact(true))).unwrap();
    assert_eq!(union.estimate(), 1500.0);

    // Values already merged through a sketch are not counted twice.
    for value in 0..1500u64 {
        union.update(value);
    }
    assert_eq!(union.estimate(), 1500.0);
}

#[test]
fn test_estimation_mode() {
    let a = sketch_of(12, 0..10_000);
    let b = sketch_of(12, 10_000..20_000);
    let mut union = ThetaUnion::builder().build().unwrap();
    union.merge(Some(&a.compact(false))).unwrap();
    union.merge(Some(&b.compact(true))).unwrap();

    let result = union.result(true);
    assert!(result.is_estimation_mode());
    assert_that!(result.num_retained(), le(4096));
    assert_that!(result.estimate(), near(20_000.0, 20_000.0 * 0.05));
    assert!(result.iter().all(|hash| hash < result.theta64()));
    assert!(result.iter().is_sorted());
}

#[test]
fn test_union_theta_never_increases() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut union = ThetaUnion::builder().lg_k(9).build().unwrap();
    let mut previous = union.union_theta64();
    for _ in 0..30 {
        let lg_k = rng.random_range(5..=11);
        let start = rng.random_range(0..100_000u64);
        let len = rng.random_range(0..20_000u64);
        let sketch = sketch_of(lg_k, start..start + len);
        union.merge(Some(&sketch.compact(rng.random()))).unwrap();

        let current = union.union_theta64();
        assert_that!(current, le(previous));
        assert_that!(current, le(sketch.theta64()));
        assert_that!(union.theta64(), le(current));
        previous = current;
    }
}

#[test]
fn test_merge_none_is_identity() {
    let mut union = ThetaUnion::builder().lg_k(8).build().unwrap();
    for value in 0..5000u64 {
        union.update(value);
    }
    let before = union.serialize_updatable();
    union.merge(None::<&CompactThetaSketch>).unwrap();
    assert_eq!(union.serialize_updatable(), before);
}

#[test]
fn test_merge_empty_sketch() {
    let mut union = ThetaUnion::builder().build().unwrap();
    let empty = ThetaSketch::builder().build();
    union.merge(Some(&empty)).unwrap();
    union.merge(Some(&empty.compact(true))).unwrap();
    assert!(union.is_empty());
    assert_eq!(union.union_theta64(), MAX_THETA);
    assert_eq!(union.estimate(), 0.0);
}

#[test]
fn test_seed_mismatch_leaves_union_unchanged() {
    let mut union = ThetaUnion::builder().build().unwrap();
    for value in 0..100u64 {
        union.update(value);
    }
    let before = union.serialize_updatable();

    let mut other = ThetaSketch::builder().seed(123).build();
    other.update(1);
    let err = union.merge(Some(&other)).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));
    let err = union.merge_bytes(&other.compact(true).serialize()).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));

    assert_eq!(union.serialize_updatable(), before);
}

#[test]
fn test_every_input_form_agrees() {
    let sketch = sketch_of(5, 0..1000);
    assert!(sketch.is_estimation_mode());

    let mut reference = ThetaUnion::builder().build().unwrap();
    reference.merge(Some(&sketch.compact(true))).unwrap();
    let expected = reference.result(true);
    assert_eq!(expected.num_retained(), sketch.num_retained());
    assert_eq!(expected.theta64(), sketch.theta64());

    assert_eq!(merged(|u| u.merge(Some(&sketch))), expected);
    assert_eq!(merged(|u| u.merge(Some(&sketch.compact(false)))), expected);

    let ordered_bytes = sketch.compact(true).serialize();
    let unordered_bytes = sketch.compact(false).serialize();
    let wrapped = WrappedCompactThetaSketch::wrap(&ordered_bytes).unwrap();
    assert!(wrapped.is_direct());
    assert_eq!(merged(|u| u.merge(Some(&wrapped))), expected);

    for bytes in [
        ordered_bytes.clone(),
        unordered_bytes,
        sketch.compact(false).serialize_v2(),
        sketch.compact(false).serialize_v1(),
        sketch.serialize_updatable(),
    ] {
        assert_eq!(merged(|u| u.merge_bytes(&bytes)), expected);
    }
}

#[test]
fn test_pull_back_to_k() {
    let mut union = ThetaUnion::builder().lg_k(5).build().unwrap();
    for value in 0..1000u64 {
        union.update(value);
    }
    assert!(union.num_retained() >= 32);

    let result = union.result(true);
    assert_eq!(result.num_retained(), 32);
    assert!(result.theta64() < MAX_THETA);
    assert!(result.theta64() <= union.union_theta64());
    assert!(result.iter().is_sorted());
    assert!(result.iter().all(|hash| hash < result.theta64()));
}

#[test]
fn test_empty_legacy_image_is_ignored() {
    let empty_v1 = ThetaSketch::builder().build().compact(true).serialize_v1();
    assert_eq!(empty_v1.len(), 24);

    let mut union = ThetaUnion::builder().build().unwrap();
    union.merge_bytes(&empty_v1).unwrap();
    union.merge_bytes(&[]).unwrap();
    assert!(union.is_empty());
    assert_eq!(union.estimate(), 0.0);

    let mut union = ThetaUnion::builder().lg_k(5).build().unwrap();
    for value in 0..1000u64 {
        union.update(value);
    }
    let theta = union.union_theta64();
    let result = union.result(true);
    union.merge_bytes(&empty_v1).unwrap();
    assert_eq!(union.union_theta64(), theta);
    assert_eq!(union.result(true), result);
}

#[test]
fn test_corrupt_family_leaves_union_unchanged() {
    let compact = sketch_of(12, 0..100).compact(true);
    let mut union = ThetaUnion::builder().build().unwrap();
    union.update("seed value");
    let before = union.serialize_updatable();

    let mut v3 = compact.serialize();
    v3[2] = 4;
    let mut v2 = compact.serialize_v2();
    v2[2] = 2;
    let mut v1 = compact.serialize_v1();
    v1[2] = 2;
    for bytes in [v3, v2, v1] {
        let err = union.merge_bytes(&bytes).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::IncompatibleFamily));
    }

    let err = union.merge_bytes(&before).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::IncompatibleFamily));

    assert_eq!(union.serialize_updatable(), before);
}

#[test]
fn test_error_messages() {
    let compact = sketch_of(12, 0..3).compact(true);
    let mut union = ThetaUnion::builder().build().unwrap();

    let mut bytes = compact.serialize();
    bytes[1] = 9;
    let err = union.merge_bytes(&bytes).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"UnknownFormatVersion => unsupported serial version: expected 1, 2 or 3, got 9"
    );

    let mut bytes = compact.serialize();
    bytes[2] = 4;
    let err = union.merge_bytes(&bytes).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"IncompatibleFamily => serial version 3 requires family 1 (Alpha) or 2 (QuickSelect) or 3 (Compact), got 4"
    );

    let mut bytes = compact.serialize_v2();
    bytes[2] = 2;
    let err = union.merge_bytes(&bytes).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"IncompatibleFamily => serial version 2 requires family 3 (SetSketch), got 2"
    );

    let bytes = compact.serialize();
    assert_eq!(bytes.len(), 40);
    let err = union.merge_bytes(&bytes[..32]).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"MalformedInput => insufficient data: entries, context: { required: 40, actual: 32 }"
    );

    let err = ThetaUnion::builder().lg_k(3).build().unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"ConfigurationError => lg_k must be in [4, 26], got 3"
    );

    let mut buf = vec![0u8; 100];
    let err = ThetaUnion::builder().lg_k(5).build_in(&mut buf).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"CapacityExceeded => buffer too small: requires 544 bytes, got 100"
    );
}

#[test]
fn test_update_canonicalizes_floats() {
    let mut union = ThetaUnion::builder().build().unwrap();
    union.update_f64(0.0);
    union.update_f64(-0.0);
    union.update_f32(0.0);
    union.update_f64(f64::NAN);
    union.update_f32(f32::NAN);
    assert_eq!(union.estimate(), 2.0);
}

#[test]
fn test_sampling_probability() {
    let union = ThetaUnion::builder()
        .sampling_probability(0.5)
        .build()
        .unwrap();
    let union_theta = union.union_theta64();
    assert!(union_theta < MAX_THETA);
    assert!(union.is_empty());
    let result = union.result(true);
    assert!(result.is_empty());
    assert_eq!(result.theta64(), union_theta);
    assert_eq!(result.estimate(), 0.0);

    let mut union = union;
    for value in 0..10_000u64 {
        union.update(value);
    }
    assert!(!union.is_empty());
    assert_that!(union.estimate(), near(10_000.0, 10_000.0 * 0.1));
}

#[test]
fn test_empty_sampled_input_lowers_result_theta() {
    let sampled = ThetaSketch::builder().sampling_probability(0.5).build();
    assert!(sampled.is_empty());
    let theta = sampled.theta64();
    assert!(theta < MAX_THETA);

    let bytes = sampled.compact(true).serialize();
    assert_eq!(bytes[0], 3);
    for result in [
        merged(|u| u.merge(Some(&sampled))),
        merged(|u| u.merge(Some(&sampled.compact(false)))),
        merged(|u| u.merge_bytes(&bytes)),
    ] {
        assert!(result.is_empty());
        assert_eq!(result.num_retained(), 0);
        assert_eq!(result.theta64(), theta);
        assert_eq!(result.estimate(), 0.0);
    }

    let mut union = ThetaUnion::builder().build().unwrap();
    union.merge_bytes(&bytes).unwrap();
    assert_eq!(union.union_theta64(), theta);
    assert_eq!(union.result(true).theta64(), union.union_theta64());

    // Later entries are screened by the lowered theta.
    let full = sketch_of(12, 0..1000);
    union.merge(Some(&full)).unwrap();
    let result = union.result(true);
    assert!(!result.is_empty());
    assert_eq!(result.theta64(), theta);
    assert!(result.iter().all(|hash| hash < theta));
}

#[test]
fn test_reset() {
    let mut union = ThetaUnion::builder().lg_k(6).build().unwrap();
    for value in 0..10_000u64 {
        union.update(value);
    }
    assert!(union.theta64() < MAX_THETA);

    union.reset();
    assert!(union.is_empty());
    assert_eq!(union.num_retained(), 0);
    assert_eq!(union.union_theta64(), MAX_THETA);
    assert_eq!(union.estimate(), 0.0);
    assert_eq!(
        union.serialize_updatable(),
        ThetaUnion::builder().lg_k(6).build().unwrap().serialize_updatable()
    );
}

#[test]
fn test_heapify_round_trip() {
    let mut union = ThetaUnion::builder().lg_k(8).build().unwrap();
    for value in 0..3000u64 {
        union.update(value);
    }
    let bytes = union.serialize_updatable();
    let mut restored = ThetaUnion::heapify(&bytes, DEFAULT_UPDATE_SEED).unwrap();
    assert_eq!(restored.serialize_updatable(), bytes);
    assert_eq!(restored.result(true), union.result(true));
    assert_eq!(restored.union_theta64(), union.union_theta64());

    for value in 3000..6000u64 {
        union.update(value);
        restored.update(value);
    }
    assert_eq!(restored.result(false), union.result(false));

    let err = ThetaUnion::heapify(&bytes, 123).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));
    let err = ThetaUnion::heapify(&bytes[..bytes.len() - 8], DEFAULT_UPDATE_SEED).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedInput));
}

#[test]
fn test_result_into() {
    let mut union = ThetaUnion::builder().build().unwrap();
    for value in 0..10u64 {
        union.update(value);
    }
    let expected = union.result(true);

    let mut buf = vec![0u8; 1024];
    let wrapped = union.result_into(true, &mut buf).unwrap();
    assert_eq!(wrapped.as_bytes().len(), expected.serialized_size());
    assert_eq!(wrapped.estimate(), 10.0);
    assert_eq!(wrapped.to_heap(), expected);

    let mut small = vec![0u8; 16];
    let err = union.result_into(true, &mut small).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::CapacityExceeded));
}
