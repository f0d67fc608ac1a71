//! Planar joint geometry and small statistics helpers.

/// Interior angle in degrees at `vertex`, between the rays to `a` and `c`.
///
/// Always within `[0, 180]`. Returns `None` when either ray has zero length.
pub fn angle_deg(a: (f64, f64), vertex: (f64, f64), c: (f64, f64)) -> Option<f64> {
    let (ax, ay) = (a.0 - vertex.0, a.1 - vertex.1);
    let (cx, cy) = (c.0 - vertex.0, c.1 - vertex.1);
    if (ax == 0.0 && ay == 0.0) || (cx == 0.0 && cy == 0.0) {
        return None;
    }
    let radians = cy.atan2(cx) - ay.atan2(ax);
    let mut degrees = radians.to_degrees().abs();
    if degrees > 180.0 {
        degrees = 360.0 - degrees;
    }
    Some(degrees)
}

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation. `None` for an empty slice.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Coefficient of variation (std / mean). `None` when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m.abs() < f64::EPSILON {
        return None;
    }
    Some(std_dev(values)? / m.abs())
}

/// Positional jitter of a 2-D track: `sqrt(var(x) + var(y))`.
pub fn positional_jitter(track: &[(f64, f64)]) -> Option<f64> {
    let xs: Vec<f64> = track.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = track.iter().map(|p| p.1).collect();
    let sx = std_dev(&xs)?;
    let sy = std_dev(&ys)?;
    Some((sx * sx + sy * sy).sqrt())
}

/// Clamp a score into `[0, 100]`. NaN maps to 0.
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn right_angle() {
        let a = angle_deg((0.0, 1.0), (0.0, 0.0), (1.0, 0.0)).unwrap();
        assert!(close(a, 90.0));
    }

    #[test]
    fn straight_line_is_180() {
        let a = angle_deg((-1.0, 0.0), (0.0, 0.0), (1.0, 0.0)).unwrap();
        assert!(close(a, 180.0));
    }

    #[test]
    fn reflex_angles_fold_back() {
        // Rays either side of the negative x axis: the raw difference is ~348.6.
        let a = angle_deg((-1.0, -0.1), (0.0, 0.0), (-1.0, 0.1)).unwrap();
        assert!(close(a, 2.0 * 0.1f64.atan().to_degrees()));
    }

    #[test]
    fn degenerate_ray_has_no_angle() {
        assert!(angle_deg((0.0, 0.0), (0.0, 0.0), (1.0, 0.0)).is_none());
    }

    #[test]
    fn statistics() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(close(mean(&v).unwrap(), 5.0));
        assert!(close(std_dev(&v).unwrap(), 2.0));
        assert!(close(coefficient_of_variation(&v).unwrap(), 0.4));
        assert!(mean(&[]).is_none());
        assert!(coefficient_of_variation(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn stationary_track_has_no_jitter() {
        let track = vec![(0.3, 0.7); 10];
        assert!(close(positional_jitter(&track).unwrap(), 0.0));
    }

    #[test]
    fn clamp_handles_nan_and_bounds() {
        assert_eq!(clamp_score(f64::NAN), 0.0);
        assert_eq!(clamp_score(-3.0), 0.0);
        assert_eq!(clamp_score(140.0), 100.0);
        assert_eq!(clamp_score(42.5), 42.5);
    }
}
