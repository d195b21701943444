//! Small numeric helpers shared by the fit driver.

/// Trapezoidal-rule integral of `y` over the (possibly non-uniform) grid
/// `x`. Returns 0 for fewer than two points.
pub fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    let mut total = 0.0;
    for i in 1..n {
        total += 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
    }
    total
}

/// Index of the element of `xs` closest to `value` (first on ties).
/// Returns 0 for an empty slice.
pub fn nearest_index(xs: &[f64], value: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &x) in xs.iter().enumerate() {
        let d = (x - value).abs();
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trapezoid_integrates_linear_exactly() {
        let x: Vec<f64> = (0..11).map(|i| i as f64 / 10.0).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2.0 * v).collect();
        // ∫ 2x dx over [0,1] = 1
        assert!((trapezoid(&y, &x) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn trapezoid_handles_non_uniform_grid() {
        let x = [0.0, 0.5, 2.0];
        let y = [1.0, 1.0, 1.0];
        assert!((trapezoid(&y, &x) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn nearest_index_picks_closest_value() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(nearest_index(&xs, 1.4), 1);
        assert_eq!(nearest_index(&xs, 1.6), 2);
        assert_eq!(nearest_index(&xs, -5.0), 0);
        assert_eq!(nearest_index(&xs, 99.0), 3);
    }
}
