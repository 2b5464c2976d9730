#[allow(dead_code)]
mod common;

use approx::assert_abs_diff_eq;

use tessera_core::align::{fit_pair, match_features, AlignParams, Feature};
use tessera_core::error::TesseraError;
use tessera_core::model::{
    filter_ransac, local_smoothness_filter, AffineModel2D, ModelKind, Point, PointMatch,
    RansacParams, SmoothnessParams,
};
use tessera_core::transform::CoordinateTransform;

fn assert_models_close(a: &AffineModel2D, b: &AffineModel2D, eps: f64) {
    assert_abs_diff_eq!(a.m00, b.m00, epsilon = eps);
    assert_abs_diff_eq!(a.m01, b.m01, epsilon = eps);
    assert_abs_diff_eq!(a.m02, b.m02, epsilon = eps);
    assert_abs_diff_eq!(a.m10, b.m10, epsilon = eps);
    assert_abs_diff_eq!(a.m11, b.m11, epsilon = eps);
    assert_abs_diff_eq!(a.m12, b.m12, epsilon = eps);
}

// ---------------------------------------------------------------------------
// Model family fits
// ---------------------------------------------------------------------------

#[test]
fn test_translation_fit() {
    let truth = AffineModel2D::translation(12.0, -7.5);
    let matches = common::synthetic_matches(&truth, 10, 1);
    let model = ModelKind::Translation.fit(&matches).unwrap();
    assert_models_close(&model, &truth, 1e-9);
    assert!(model.cost < 1e-9);
}

#[test]
fn test_rigid_fit() {
    let truth = common::rigid(0.3, 40.0, -25.0);
    let matches = common::synthetic_matches(&truth, 12, 2);
    let model = ModelKind::Rigid.fit(&matches).unwrap();
    assert_models_close(&model, &truth, 1e-9);
}

#[test]
fn test_similarity_fit() {
    let (s, c) = 0.2f64.sin_cos();
    let truth = AffineModel2D::new(1.5 * c, -1.5 * s, 3.0, 1.5 * s, 1.5 * c, 9.0);
    let matches = common::synthetic_matches(&truth, 12, 3);
    let model = ModelKind::Similarity.fit(&matches).unwrap();
    assert_models_close(&model, &truth, 1e-9);
}

#[test]
fn test_affine_fit() {
    let truth = AffineModel2D::new(1.1, 0.05, -3.0, -0.08, 0.93, 17.0);
    let matches = common::synthetic_matches(&truth, 8, 4);
    let model = ModelKind::Affine.fit(&matches).unwrap();
    assert_models_close(&model, &truth, 1e-8);
}

#[test]
fn test_rigid_fit_ignores_scale() {
    let truth = AffineModel2D::new(2.0, 0.0, 0.0, 0.0, 2.0, 0.0);
    let matches = common::synthetic_matches(&truth, 10, 5);
    let model = ModelKind::Rigid.fit(&matches).unwrap();
    assert_abs_diff_eq!(model.determinant(), 1.0, epsilon = 1e-9);
}

#[test]
fn test_fit_with_too_few_matches() {
    let truth = AffineModel2D::identity();
    let matches = common::synthetic_matches(&truth, 2, 6);
    let err = ModelKind::Affine.fit(&matches).unwrap_err();
    assert!(matches!(
        err,
        TesseraError::NotEnoughDataPoints {
            required: 3,
            found: 2
        }
    ));
    assert_eq!(ModelKind::Translation.min_num_matches(), 1);
    assert_eq!(ModelKind::Rigid.min_num_matches(), 2);
    assert_eq!(ModelKind::Similarity.min_num_matches(), 2);
}

#[test]
fn test_coincident_points_are_ill_defined() {
    let matches = vec![
        PointMatch::new(Point::new([5.0, 5.0]), Point::new([6.0, 5.0])),
        PointMatch::new(Point::new([5.0, 5.0]), Point::new([6.0, 5.0])),
    ];
    let err = ModelKind::Rigid.fit(&matches).unwrap_err();
    assert!(matches!(err, TesseraError::IllDefinedDataPoints(_)));
}

// ---------------------------------------------------------------------------
// Affine algebra
// ---------------------------------------------------------------------------

#[test]
fn test_concatenate_applies_other_first() {
    let mut a = AffineModel2D::translation(10.0, 0.0);
    let b = AffineModel2D::new(2.0, 0.0, 0.0, 0.0, 2.0, 0.0);
    a.concatenate(&b);
    // a(b(p)) = 2p + (10, 0)
    assert_eq!(a.apply([1.0, 1.0]), [12.0, 2.0]);

    let mut c = AffineModel2D::translation(10.0, 0.0);
    c.pre_concatenate(&b);
    // b(c(p)) = 2(p + (10, 0))
    assert_eq!(c.apply([1.0, 1.0]), [22.0, 2.0]);
}

#[test]
fn test_singular_affine_has_no_inverse() {
    let m = AffineModel2D::new(1.0, 2.0, 0.0, 2.0, 4.0, 0.0);
    assert!(!m.is_invertible());
    assert!(matches!(
        m.create_inverse(),
        Err(TesseraError::NoninvertibleModel(_))
    ));
}

// ---------------------------------------------------------------------------
// RANSAC
// ---------------------------------------------------------------------------

fn ransac_params(seed: u64) -> RansacParams {
    RansacParams {
        iterations: 1000,
        max_epsilon: 5.0,
        min_inlier_ratio: 0.2,
        min_num_inliers: 9,
        max_trust: 3.0,
        seed: Some(seed),
    }
}

#[test]
fn test_ransac_rejects_outliers() {
    let truth = AffineModel2D::new(0.98, 0.1, 20.0, -0.1, 0.98, -15.0);
    let mut candidates = common::synthetic_matches(&truth, 30, 10);
    for (k, m) in common::synthetic_matches(&truth, 8, 11).iter().enumerate() {
        let mut outlier = *m;
        outlier.p2.w[0] += 100.0 + 10.0 * k as f64;
        outlier.p2.w[1] -= 80.0;
        candidates.push(outlier);
    }

    let outcome = filter_ransac(ModelKind::Affine, &candidates, &ransac_params(42))
        .unwrap()
        .expect("a model");
    assert_eq!(outcome.inliers.len(), 30);
    assert_models_close(&outcome.model, &truth, 1e-6);
}

#[test]
fn test_ransac_is_deterministic_with_seed() {
    let truth = common::rigid(0.05, 3.0, 4.0);
    let mut candidates = common::synthetic_matches(&truth, 20, 12);
    for m in common::synthetic_matches(&truth, 10, 13) {
        let mut outlier = m;
        outlier.p2.w[1] += 300.0;
        candidates.push(outlier);
    }
    let a = filter_ransac(ModelKind::Rigid, &candidates, &ransac_params(7))
        .unwrap()
        .unwrap();
    let b = filter_ransac(ModelKind::Rigid, &candidates, &ransac_params(7))
        .unwrap()
        .unwrap();
    assert_eq!(a.inliers, b.inliers);
    assert_eq!(a.model, b.model);
}

#[test]
fn test_ransac_without_consensus_returns_none() {
    // Every match points somewhere unrelated.
    let candidates: Vec<PointMatch> = (0..20)
        .map(|i| {
            let x = i as f64 * 50.0;
            PointMatch::new(
                Point::new([x, 0.0]),
                Point::new([(i * 7919 % 13) as f64 * 300.0, x * 3.0]),
            )
        })
        .collect();
    let mut params = ransac_params(3);
    params.min_inlier_ratio = 0.9;
    let outcome = filter_ransac(ModelKind::Translation, &candidates, &params).unwrap();
    assert!(outcome.is_none());
}

#[test]
fn test_ransac_with_too_few_candidates() {
    let candidates = common::synthetic_matches(&AffineModel2D::identity(), 2, 14);
    let err = filter_ransac(ModelKind::Affine, &candidates, &ransac_params(1)).unwrap_err();
    assert!(matches!(err, TesseraError::NotEnoughDataPoints { .. }));
}

// ---------------------------------------------------------------------------
// Feature matching and pair fits
// ---------------------------------------------------------------------------

#[test]
fn test_ratio_test_keeps_distinct_matches() {
    let truth = common::rigid(0.0, 10.0, 10.0);
    let (a, b) = common::synthetic_feature_pair(&truth, 15, 0, 20);
    let matches = match_features(&a, &b, 0.92);
    assert_eq!(matches.len(), 15);
    for m in &matches {
        let expected = truth.apply(m.p1.l);
        assert_abs_diff_eq!(m.p2.l[0], expected[0], epsilon = 1e-9);
        assert_abs_diff_eq!(m.p2.l[1], expected[1], epsilon = 1e-9);
    }
}

#[test]
fn test_ambiguous_targets_are_dropped() {
    let descriptor = vec![1.0, 0.0, 0.0, 0.0];
    let other = vec![0.0, 1.0, 0.0, 0.0];
    let feature = |x: f64, d: &Vec<f32>| Feature {
        location: [x, 0.0],
        scale: 1.0,
        orientation: 0.0,
        descriptor: d.clone(),
    };
    // Two sources share their only close target.
    let sources = vec![feature(0.0, &descriptor), feature(5.0, &descriptor)];
    let targets = vec![feature(1.0, &descriptor), feature(9.0, &other)];
    assert!(match_features(&sources, &targets, 0.92).is_empty());
}

#[test]
fn test_fit_pair_recovers_synthetic_offset() {
    let truth = common::rigid(0.1, 30.0, -12.0);
    let (a, b) = common::synthetic_feature_pair(&truth, 40, 10, 21);
    let params = AlignParams {
        seed: Some(5),
        ..AlignParams::default()
    };
    let (candidates, outcome) = fit_pair(&a, &b, &params, params.seed);
    assert_eq!(candidates, 50);
    let outcome = outcome.expect("a model");
    assert_eq!(outcome.inliers.len(), 40);
    assert_models_close(&outcome.model, &truth, 1e-6);
}

#[test]
fn test_fit_pair_needs_enough_candidates() {
    let truth = common::rigid(0.0, 1.0, 1.0);
    let (a, b) = common::synthetic_feature_pair(&truth, 5, 0, 22);
    let params = AlignParams::default();
    assert_eq!(params.min_candidates(), 6);
    let (candidates, outcome) = fit_pair(&a, &b, &params, Some(1));
    assert_eq!(candidates, 5);
    assert!(outcome.is_none());
}

// ---------------------------------------------------------------------------
// Local smoothness
// ---------------------------------------------------------------------------

#[test]
fn test_smoothness_filter_drops_local_outlier() {
    let truth = AffineModel2D::translation(4.0, 2.0);
    let mut matches = common::synthetic_matches(&truth, 40, 30);
    matches[7].p2.w[0] += 60.0;
    let params = SmoothnessParams {
        model: ModelKind::Translation,
        sigma: 500.0,
        max_epsilon: 10.0,
        max_trust: 3.0,
    };
    let kept = local_smoothness_filter(&matches, &params);
    assert_eq!(kept.len(), 39);
    assert!(kept.iter().all(|m| *m != matches[7]));
}
