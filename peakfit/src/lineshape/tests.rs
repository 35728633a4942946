//! Tests for the pseudo-Voigt model.

use super::*;

fn sample_peaks() -> Vec<PeakParams> {
    vec![
        PeakParams {
            amplitude: 1200.0,
            center: DVec2::new(10.3, 7.8),
            sigma: DVec2::new(1.7, 2.4),
            fraction: 0.3,
        },
        PeakParams {
            amplitude: -450.0,
            center: DVec2::new(14.0, 9.1),
            sigma: DVec2::new(2.2, 1.1),
            fraction: 0.8,
        },
    ]
}

#[test]
fn test_profiles_are_height_normalised() {
    assert_eq!(gaussian(3.0, 3.0, 1.5), 1.0);
    assert_eq!(lorentzian(3.0, 3.0, 1.5), 1.0);
    for f in [0.0, 0.25, 1.0] {
        assert!((pseudo_voigt(-2.0, -2.0, 0.7, f) - 1.0).abs() < 1e-15);
    }
}

#[test]
fn test_half_maximum_at_sigma_for_any_fraction() {
    for f in [0.0, 0.5, 1.0] {
        let v = pseudo_voigt(5.0 + 2.0, 5.0, 2.0, f);
        assert!((v - 0.5).abs() < 1e-12, "fraction {f}: {v}");
    }
    assert_eq!(sigma_to_fwhm(1.25), 2.5);
}

#[test]
fn test_fraction_selects_component() {
    let t = 4.1;
    assert!((pseudo_voigt(t, 2.0, 1.3, 0.0) - gaussian(t, 2.0, 1.3)).abs() < 1e-15);
    assert!((pseudo_voigt(t, 2.0, 1.3, 1.0) - lorentzian(t, 2.0, 1.3)).abs() < 1e-15);
}

#[test]
fn test_composite_is_sum_of_peaks() {
    let peaks = sample_peaks();
    let params = CompositeModel::pack(&peaks);
    let model = CompositeModel::new(peaks.len());
    assert_eq!(model.param_count(), 12);

    let (x, y) = (12.0, 8.0);
    let expected: f64 = peaks.iter().map(|p| p.evaluate(x, y)).sum();
    assert!((model.evaluate(x, y, &params) - expected).abs() < 1e-9);
}

#[test]
fn test_pack_unpack_preserves_layout() {
    let peaks = sample_peaks();
    let params = CompositeModel::pack(&peaks);
    assert_eq!(params[PARAMS_PER_PEAK + AMPLITUDE], -450.0);
    assert_eq!(params[SIGMA_Y], 2.4);
    assert_eq!(CompositeModel::unpack(&params), peaks);
}

#[test]
fn test_analytic_gradient_matches_finite_differences() {
    let peaks = sample_peaks();
    let params = CompositeModel::pack(&peaks);
    let model = CompositeModel::new(peaks.len());
    let mut gradient = vec![0.0; params.len()];

    for &(x, y) in &[(9.0, 7.0), (12.5, 8.5), (15.0, 10.0)] {
        let value = model.evaluate_with_gradient(x, y, &params, &mut gradient);
        assert!((value - model.evaluate(x, y, &params)).abs() < 1e-9);

        for i in 0..params.len() {
            let h = 1e-6 * params[i].abs().max(1.0);
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[i] += h;
            minus[i] -= h;
            let numeric = (model.evaluate(x, y, &plus) - model.evaluate(x, y, &minus)) / (2.0 * h);
            let tol = 1e-5 * numeric.abs().max(1.0);
            assert!(
                (gradient[i] - numeric).abs() < tol,
                "param {i} at ({x}, {y}): analytic {} vs numeric {numeric}",
                gradient[i]
            );
        }
    }
}
