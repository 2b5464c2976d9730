use approx::assert_abs_diff_eq;

use tessera_core::error::TesseraError;
use tessera_core::model::{AffineModel2D, Point, PointMatch};
use tessera_core::transform::{
    class_name, CoordinateTransform, CubicBSplineTransform, PolynomialKernelTransform,
    PolynomialTransform2D, ThinPlateSplineTransform, Transform, TransformChain,
};

const POLYNOMIAL_DATA: &str = "67572.7357 0.97263708 -0.0266434795 -3.08962708e-06 \
     3.52672467e-06 1.36924462e-07 5446.8534 0.022404762 0.96120261 -3.3675352e-07 \
     -8.9721973e-07 -5.4985399e-06";

const PROBES: [[f64; 2]; 4] = [[0.0, 0.0], [12.5, -3.0], [1024.0, 768.0], [-40.0, 2000.0]];

fn assert_applies_identically(a: &Transform, b: &Transform) {
    for p in PROBES {
        assert_eq!(a.apply(p), b.apply(p), "probe {:?}", p);
    }
}

fn reparse(t: &Transform) -> Transform {
    Transform::from_class_and_data(t.class_name(), &t.to_data_string()).unwrap()
}

// ---------------------------------------------------------------------------
// Affine
// ---------------------------------------------------------------------------

#[test]
fn test_affine_data_order_is_column_major() {
    let t = Transform::from_class_and_data(class_name::AFFINE, "1.0 0.0 0.0 1.0 10.0 20.0")
        .unwrap();
    assert_eq!(t.apply([1.0, 2.0]), [11.0, 22.0]);
    assert_eq!(t.to_data_string(), "1.0 0.0 0.0 1.0 10.0 20.0");
}

#[test]
fn test_affine_round_trip_is_bit_exact() {
    let model = AffineModel2D::new(0.99, -0.1234567, 1e-9, 0.1234567, 1.01, 123456789.5);
    let t = Transform::Affine(model);
    assert_applies_identically(&t, &reparse(&t));
}

#[test]
fn test_affine_inverse() {
    let t = Transform::Affine(AffineModel2D::new(2.0, 0.5, 3.0, -0.25, 1.5, -7.0));
    assert!(t.is_invertible());
    for p in PROBES {
        let back = t.apply_inverse(t.apply(p)).unwrap();
        assert_abs_diff_eq!(back[0], p[0], epsilon = 1e-9);
        assert_abs_diff_eq!(back[1], p[1], epsilon = 1e-9);
    }
}

#[test]
fn test_affine_wrong_token_count_is_format_error() {
    let err = AffineModel2D::init("1 0 0 1 0").unwrap_err();
    assert!(matches!(err, TesseraError::Format { .. }));
}

#[test]
fn test_affine_non_number_is_format_error() {
    let err = AffineModel2D::init("1 0 0 1 x 0").unwrap_err();
    assert!(matches!(err, TesseraError::Format { .. }));
}

// ---------------------------------------------------------------------------
// Polynomial
// ---------------------------------------------------------------------------

#[test]
fn test_polynomial_second_order_round_trip() {
    let t = Transform::from_class_and_data(class_name::POLYNOMIAL, POLYNOMIAL_DATA).unwrap();
    let Transform::Polynomial(ref poly) = t else {
        panic!("expected a polynomial");
    };
    assert_eq!(poly.order(), 2);
    assert_eq!(t.min_num_matches(), 6);
    assert_applies_identically(&t, &reparse(&t));

    // Origin maps to the two constant terms.
    assert_eq!(t.apply([0.0, 0.0]), [67572.7357, 5446.8534]);
}

#[test]
fn test_polynomial_small_coefficients_use_exponent_notation() {
    let t = Transform::from_class_and_data(class_name::POLYNOMIAL, POLYNOMIAL_DATA).unwrap();
    let data = t.to_data_string();
    assert!(data.contains("E-6"), "{data}");
    assert!(!data.ends_with(' '));
}

#[test]
fn test_polynomial_fractional_order_is_rejected() {
    let err = PolynomialTransform2D::init("1 2 3 4 5 6 7 8").unwrap_err();
    assert!(matches!(err, TesseraError::Format { .. }));
}

#[test]
fn test_polynomial_fit_recovers_affine() {
    let model = AffineModel2D::new(1.1, 0.2, 5.0, -0.3, 0.9, -2.0);
    let matches: Vec<PointMatch> = (0..5)
        .flat_map(|i| (0..5).map(move |j| [i as f64 * 20.0, j as f64 * 15.0]))
        .map(|l| PointMatch::new(Point::new(l), Point::new(model.apply(l))))
        .collect();
    let mut poly = PolynomialTransform2D::identity(2);
    poly.fit(&matches).unwrap();
    for p in PROBES {
        let expected = model.apply(p);
        let got = poly.apply(p);
        assert_abs_diff_eq!(got[0], expected[0], epsilon = 1e-6);
        assert_abs_diff_eq!(got[1], expected[1], epsilon = 1e-6);
    }
}

#[test]
fn test_polynomial_has_no_exact_inverse() {
    let t = Transform::Polynomial(PolynomialTransform2D::identity(1));
    assert!(!t.is_invertible());
    let err = t.apply_inverse([1.0, 1.0]).unwrap_err();
    assert!(matches!(err, TesseraError::NoninvertibleModel(_)));
}

// ---------------------------------------------------------------------------
// Homography
// ---------------------------------------------------------------------------

#[test]
fn test_homography_round_trip_and_inverse() {
    let data = "1.2 0.1 4.0 -0.05 0.95 -3.0 0.0001 0.0002 1.0";
    let t = Transform::from_class_and_data(class_name::HOMOGRAPHY, data).unwrap();
    assert_applies_identically(&t, &reparse(&t));
    for p in PROBES {
        let back = t.apply_inverse(t.apply(p)).unwrap();
        assert_abs_diff_eq!(back[0], p[0], epsilon = 1e-6);
        assert_abs_diff_eq!(back[1], p[1], epsilon = 1e-6);
    }
}

#[test]
fn test_homography_wrong_token_count_is_format_error() {
    let err = Transform::from_class_and_data(class_name::HOMOGRAPHY, "1 0 0 0 1 0 0 0")
        .unwrap_err();
    assert!(matches!(err, TesseraError::Format { .. }));
}

// ---------------------------------------------------------------------------
// Thin-plate spline
// ---------------------------------------------------------------------------

fn landmark_spline() -> ThinPlateSplineTransform {
    let pairs = [
        ([0.0, 0.0], [1.0, 2.0]),
        ([100.0, 0.0], [102.0, 1.0]),
        ([0.0, 100.0], [-1.0, 103.0]),
        ([100.0, 100.0], [99.0, 101.0]),
        ([50.0, 50.0], [53.0, 48.0]),
    ];
    let matches: Vec<PointMatch> = pairs
        .iter()
        .map(|&(s, t)| PointMatch::new(Point::new(s), Point::new(t)))
        .collect();
    ThinPlateSplineTransform::fit(&matches).unwrap()
}

#[test]
fn test_thin_plate_spline_interpolates_landmarks() {
    let spline = landmark_spline();
    assert_eq!(spline.num_landmarks(), 5);
    let got = spline.apply([50.0, 50.0]);
    assert_abs_diff_eq!(got[0], 53.0, epsilon = 1e-6);
    assert_abs_diff_eq!(got[1], 48.0, epsilon = 1e-6);
    let got = spline.apply([100.0, 0.0]);
    assert_abs_diff_eq!(got[0], 102.0, epsilon = 1e-6);
    assert_abs_diff_eq!(got[1], 1.0, epsilon = 1e-6);
}

#[test]
fn test_thin_plate_spline_round_trip() {
    let t = Transform::ThinPlateSpline(landmark_spline());
    let data = t.to_data_string();
    assert!(data.starts_with("ThinPlateSplineR2LogR 2 5 "), "{data}");
    let back = reparse(&t);
    for p in PROBES {
        let (a, b) = (t.apply(p), back.apply(p));
        assert_abs_diff_eq!(a[0], b[0], epsilon = 1e-9);
        assert_abs_diff_eq!(a[1], b[1], epsilon = 1e-9);
    }
}

#[test]
fn test_thin_plate_spline_rejects_other_dimensions_and_tags() {
    let t = Transform::ThinPlateSpline(landmark_spline());
    let data = t.to_data_string();
    let three_d = data.replacen(" 2 5 ", " 3 5 ", 1);
    assert!(matches!(
        ThinPlateSplineTransform::init(&three_d),
        Err(TesseraError::Format { .. })
    ));
    let bad_tag = data.replacen("ThinPlateSplineR2LogR", "Gaussian", 1);
    assert!(matches!(
        ThinPlateSplineTransform::init(&bad_tag),
        Err(TesseraError::Format { .. })
    ));
}

#[test]
fn test_thin_plate_spline_needs_three_landmarks() {
    let matches = vec![
        PointMatch::new(Point::new([0.0, 0.0]), Point::new([0.0, 0.0])),
        PointMatch::new(Point::new([1.0, 0.0]), Point::new([1.0, 0.0])),
    ];
    let err = ThinPlateSplineTransform::fit(&matches).unwrap_err();
    assert!(matches!(
        err,
        TesseraError::NotEnoughDataPoints {
            required: 3,
            found: 2
        }
    ));
}

// ---------------------------------------------------------------------------
// Cubic B-spline
// ---------------------------------------------------------------------------

#[test]
fn test_bspline_constant_grid_is_constant() {
    let size = (2 + 3) * (2 + 3);
    let t = CubicBSplineTransform::new(64, 48, 2, vec![7.5; size], vec![-2.0; size]).unwrap();
    for p in [[0.0, 0.0], [31.5, 20.0], [63.0, 47.0]] {
        let q = t.apply(p);
        assert_abs_diff_eq!(q[0], 7.5, epsilon = 1e-9);
        assert_abs_diff_eq!(q[1], -2.0, epsilon = 1e-9);
    }
}

#[test]
fn test_bspline_round_trip() {
    let size = (1 + 3) * (1 + 3);
    let cx: Vec<f64> = (0..size).map(|i| i as f64 * 1.25).collect();
    let cy: Vec<f64> = (0..size).map(|i| 100.0 - i as f64 * 0.5).collect();
    let t = Transform::BSpline(CubicBSplineTransform::new(32, 32, 1, cx, cy).unwrap());
    let back = reparse(&t);
    for p in [[0.0, 0.0], [10.0, 20.0], [31.0, 31.0]] {
        let (a, b) = (t.apply(p), back.apply(p));
        assert_abs_diff_eq!(a[0], b[0], epsilon = 1e-9);
        assert_abs_diff_eq!(a[1], b[1], epsilon = 1e-9);
    }
}

#[test]
fn test_bspline_declared_grid_must_match_tokens() {
    // One interval needs 3 + 2 * 16 tokens.
    let mut data = String::from("32 32 1");
    for _ in 0..31 {
        data.push_str(" 0.0");
    }
    let err = CubicBSplineTransform::init(&data).unwrap_err();
    assert!(matches!(err, TesseraError::Format { .. }));
}

// ---------------------------------------------------------------------------
// Polynomial kernel
// ---------------------------------------------------------------------------

#[test]
fn test_polynomial_kernel_round_trip() {
    // Dimension 1: features x, y and the constant term.
    let t = Transform::PolynomialKernel(
        PolynomialKernelTransform::new(
            1,
            vec![[10.0, 0.0], [0.0, 20.0], [1.0, 2.0]],
            vec![50.0, 40.0, 0.0],
            vec![25.0, 30.0, 1.0],
            100,
            80,
        )
        .unwrap(),
    );
    let data = t.to_data_string();
    assert!(data.starts_with("1 3 "), "{data}");
    assert!(data.ends_with(" 100 80"), "{data}");
    assert_applies_identically(&t, &reparse(&t));
}

#[test]
fn test_polynomial_kernel_length_must_match_dimension() {
    let err = PolynomialKernelTransform::new(
        2,
        vec![[0.0, 0.0]; 3],
        vec![0.0; 3],
        vec![1.0; 3],
        10,
        10,
    )
    .unwrap_err();
    assert!(matches!(err, TesseraError::Format { .. }));
}

// ---------------------------------------------------------------------------
// Dispatch, XML and chains
// ---------------------------------------------------------------------------

#[test]
fn test_unknown_class_is_format_error() {
    let err = Transform::from_class_and_data("mpicbg.models.Nonsense", "1 2 3").unwrap_err();
    assert!(matches!(err, TesseraError::Format { .. }));
}

#[test]
fn test_to_xml_element_names() {
    let affine = Transform::Affine(AffineModel2D::translation(1.0, 2.0));
    assert_eq!(
        affine.to_xml("  "),
        "  <iict_transform class=\"mpicbg.trakem2.transform.AffineModel2D\" \
         data=\"1.0 0.0 0.0 1.0 1.0 2.0\"/>"
    );
    let spline = Transform::ThinPlateSpline(landmark_spline());
    assert!(spline.to_xml("").starts_with("<ict_transform class=\""));
}

#[test]
fn test_chain_applies_first_to_last() {
    let mut chain = TransformChain::new();
    assert!(chain.is_empty());
    chain.push(Transform::Affine(AffineModel2D::new(
        2.0, 0.0, 0.0, 0.0, 2.0, 0.0,
    )));
    chain.push(Transform::Affine(AffineModel2D::translation(5.0, -1.0)));
    assert_eq!(chain.len(), 2);
    assert_eq!(chain.apply([1.0, 1.0]), [7.0, 1.0]);
}
