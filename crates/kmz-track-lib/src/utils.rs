//! Utility functions for geodesic metadata and display formatting

use geo::{Coord, Point, Rect};

/// Earth's mean radius in meters
pub const EARTH_RADIUS_M: f64 = 6371000.0;

/// Calculate the Haversine distance between two lon/lat points in meters
#[inline]
pub fn haversine_distance(p1: Point<f64>, p2: Point<f64>) -> f64 {
    let lat1 = p1.y().to_radians();
    let lat2 = p2.y().to_radians();
    let delta_lat = (p2.y() - p1.y()).to_radians();
    let delta_lon = (p2.x() - p1.x()).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Sum of Haversine distances between consecutive points
pub fn path_length_meters(points: &[Point<f64>]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_distance(pair[0], pair[1]))
        .sum()
}

/// Smallest rectangle containing every point, or `None` for an empty slice
pub fn bounding_box(points: &[Point<f64>]) -> Option<Rect<f64>> {
    let first = points.first()?;
    let (mut min_x, mut min_y) = (first.x(), first.y());
    let (mut max_x, mut max_y) = (first.x(), first.y());

    for point in &points[1..] {
        min_x = min_x.min(point.x());
        min_y = min_y.min(point.y());
        max_x = max_x.max(point.x());
        max_y = max_y.max(point.y());
    }

    Some(Rect::new(
        Coord { x: min_x, y: min_y },
        Coord { x: max_x, y: max_y },
    ))
}

/// Format a distance as a human-readable string
pub fn format_distance(meters: f64) -> String {
    let km = meters / 1000.0;
    if km < 1.0 {
        format!("{:.0} m", meters)
    } else if km < 100.0 {
        format!("{:.2} km", km)
    } else {
        format!("{:.0} km", km)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero() {
        let p = Point::new(8.54, 47.37);
        assert!(haversine_distance(p, p).abs() < f64::EPSILON);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        // One degree of latitude is roughly 111 km
        let d = haversine_distance(Point::new(0.0, 0.0), Point::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 100.0);
    }

    #[test]
    fn test_path_length_sums_segments() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(0.0, 2.0),
        ];
        let total = path_length_meters(&points);
        let single = haversine_distance(points[0], points[1]);
        assert!((total - 2.0 * single).abs() < 1.0);
        assert_eq!(path_length_meters(&points[..1]), 0.0);
    }

    #[test]
    fn test_bounding_box() {
        assert!(bounding_box(&[]).is_none());

        let bbox = bounding_box(&[Point::new(1.0, 5.0), Point::new(-2.0, 7.0)]).unwrap();
        assert_eq!(bbox.min(), Coord { x: -2.0, y: 5.0 });
        assert_eq!(bbox.max(), Coord { x: 1.0, y: 7.0 });
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(512.0), "512 m");
        assert_eq!(format_distance(12_345.0), "12.35 km");
        assert_eq!(format_distance(250_000.0), "250 km");
    }
}
