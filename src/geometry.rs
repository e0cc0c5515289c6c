// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Planar angle computation.

use crate::error::MetricError;
use crate::pose::Point;

/// Points closer than this are treated as coincident.
pub const COINCIDENT_EPSILON: f32 = 1e-6;

/// Unsigned angle at vertex `b` between rays `b→a` and `b→c`, in degrees.
///
/// The result lies in `[0, 180]` and is symmetric in `a` and `c`. Colinear
/// points are valid (0° or 180°); coincident or non-finite points are not.
///
/// # Errors
///
/// Returns [`MetricError::DegenerateGeometry`] when `a` or `c` coincides with
/// `b` or any coordinate is NaN/infinite.
///
/// # Example
///
/// ```
/// use pose_goniometry::geometry::angle_at;
/// use pose_goniometry::pose::Point;
///
/// let knee = Point::new(100.0, 100.0);
/// let ankle = Point::new(100.0, 200.0);
/// let toe = Point::new(150.0, 200.0);
/// let angle = angle_at(knee, ankle, toe).unwrap();
/// assert!((angle - 90.0).abs() < 1e-4);
/// ```
pub fn angle_at(a: Point, b: Point, c: Point) -> Result<f32, MetricError> {
    if !(a.is_finite() && b.is_finite() && c.is_finite()) {
        return Err(MetricError::DegenerateGeometry);
    }
    if a.distance(&b) < COINCIDENT_EPSILON || c.distance(&b) < COINCIDENT_EPSILON {
        return Err(MetricError::DegenerateGeometry);
    }

    let theta = (c.y - b.y).atan2(c.x - b.x) - (a.y - b.y).atan2(a.x - b.x);
    let mut angle = theta.abs().to_degrees();
    if angle > 180.0 {
        angle = 360.0 - angle;
    }
    Ok(angle.clamp(0.0, 180.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f32, y: f32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn test_right_angle() {
        let angle = angle_at(p(100.0, 100.0), p(100.0, 200.0), p(150.0, 200.0)).unwrap();
        assert!((angle - 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_straight_line() {
        let angle = angle_at(p(0.0, 0.0), p(1.0, 0.0), p(2.0, 0.0)).unwrap();
        assert!((angle - 180.0).abs() < 1e-4);
    }

    #[test]
    fn test_same_direction_is_zero() {
        let angle = angle_at(p(5.0, 0.0), p(0.0, 0.0), p(10.0, 0.0)).unwrap();
        assert!(angle.abs() < 1e-4);
    }

    #[test]
    fn test_reflex_wraps_below_180() {
        // atan2 difference here exceeds 180° before wrapping
        let angle = angle_at(p(-1.0, 1.0), p(0.0, 0.0), p(-1.0, -1.0)).unwrap();
        assert!((angle - 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_symmetry_and_range() {
        let samples = [
            (p(3.0, 7.0), p(-2.0, 1.5), p(10.0, -4.0)),
            (p(0.1, 0.2), p(5.0, 5.0), p(-3.0, 9.0)),
            (p(640.0, 12.0), p(320.0, 240.0), p(0.0, 480.0)),
            (p(-50.0, -50.0), p(0.0, 0.0), p(50.0, -49.0)),
            (p(1.0, 0.0), p(0.0, 0.0), p(-1.0, 0.0001)),
        ];
        for (a, b, c) in samples {
            let forward = angle_at(a, b, c).unwrap();
            let backward = angle_at(c, b, a).unwrap();
            assert!((forward - backward).abs() < 1e-3, "{forward} != {backward}");
            assert!((0.0..=180.0).contains(&forward));
        }
    }

    #[test]
    fn test_coincident_points_are_degenerate() {
        assert_eq!(
            angle_at(p(1.0, 1.0), p(1.0, 1.0), p(2.0, 2.0)),
            Err(MetricError::DegenerateGeometry)
        );
        assert_eq!(
            angle_at(p(0.0, 0.0), p(1.0, 1.0), p(1.0, 1.0)),
            Err(MetricError::DegenerateGeometry)
        );
    }

    #[test]
    fn test_nan_is_degenerate() {
        assert_eq!(
            angle_at(p(f32::NAN, 0.0), p(1.0, 1.0), p(2.0, 2.0)),
            Err(MetricError::DegenerateGeometry)
        );
    }
}
