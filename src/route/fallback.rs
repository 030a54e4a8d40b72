use crate::state::Position;

/// Curved stand-in path between two points.
///
/// A quadratic Bézier whose control point is the midpoint pushed sideways by
/// `curvature` times the segment length. Purely visual: it follows no roads.
pub fn approximate_curve(
    origin: Position,
    destination: Position,
    segments: usize,
    curvature: f64,
) -> Vec<Position> {
    let segments = segments.max(2);

    let d_lat = destination.lat - origin.lat;
    let d_lng = destination.lng - origin.lng;
    // Perpendicular to the origin->destination vector
    let control = Position {
        lat: (origin.lat + destination.lat) / 2.0 + curvature * d_lng,
        lng: (origin.lng + destination.lng) / 2.0 - curvature * d_lat,
    };

    (0..=segments)
        .map(|i| {
            if i == 0 {
                return origin;
            }
            if i == segments {
                return destination;
            }
            let t = i as f64 / segments as f64;
            let a = (1.0 - t) * (1.0 - t);
            let b = 2.0 * (1.0 - t) * t;
            let c = t * t;
            Position {
                lat: a * origin.lat + b * control.lat + c * destination.lat,
                lng: a * origin.lng + b * control.lng + c * destination.lng,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_endpoints_are_exact() {
        let origin = Position::new(12.9, 77.5);
        let destination = Position::new(13.0, 77.7);
        let curve = approximate_curve(origin, destination, 32, 0.2);

        assert_eq!(curve.len(), 33);
        assert_eq!(curve[0], origin);
        assert_eq!(curve[32], destination);
    }

    #[test]
    fn test_curve_bows_away_from_straight_line() {
        let curve = approximate_curve(Position::new(0.0, 0.0), Position::new(0.0, 10.0), 4, 0.2);
        // Midpoint of a due-east segment is pushed north
        let mid = curve[2];
        assert!((mid.lng - 5.0).abs() < 1e-9);
        assert!((mid.lat - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_curvature_is_straight() {
        let curve = approximate_curve(Position::new(0.0, 0.0), Position::new(4.0, 4.0), 4, 0.0);
        for point in curve {
            assert!((point.lat - point.lng).abs() < 1e-9);
        }
    }

    #[test]
    fn test_segments_have_a_floor() {
        let curve = approximate_curve(Position::new(0.0, 0.0), Position::new(1.0, 1.0), 0, 0.2);
        assert_eq!(curve.len(), 3);
    }
}
